//! Per-channel payload rendering. The rendered payload is snapshotted into
//! the dispatch attempt so later event edits never change what was sent.

use serde::{Deserialize, Serialize};

use epiwatch_core::Event;
use epiwatch_core::time::format_rfc3339;

use crate::types::{AlertChannel, Trigger};

/// Rendered alert content for every channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertPayload {
    pub sms_text: String,
    pub push_title: String,
    pub push_body: String,
    /// Structured body for the in-app feed.
    pub in_app: serde_json::Value,
    /// Text encoded into a shareable QR code.
    pub qr_text: String,
}

impl AlertPayload {
    pub fn render(event: &Event, trigger: &Trigger) -> Self {
        let headline = format!(
            "{} {} near {}",
            event.severity.to_string().to_uppercase(),
            event.hazard,
            event.centroid
        );
        let sms_text = format!(
            "EPIWATCH {headline}. {} report(s), status {}.",
            event.signal_ids.len(),
            trigger.to
        );
        let push_title = format!("Epiwatch: {} {}", event.severity, event.hazard);
        let push_body = format!(
            "{} report(s) near {}. Status changed to {}.",
            event.signal_ids.len(),
            event.centroid,
            trigger.to
        );
        let in_app = serde_json::json!({
            "event_id": event.id,
            "hazard": event.hazard,
            "severity": event.severity,
            "status": trigger.to,
            "centroid": event.centroid,
            "signal_count": event.signal_ids.len(),
            "updated_at": format_rfc3339(event.updated_at),
        });
        let qr_text = format!(
            "epiwatch://event/{}?hazard={}&severity={}&status={}",
            event.id, event.hazard, event.severity, trigger.to
        );
        Self {
            sms_text,
            push_title,
            push_body,
            in_app,
            qr_text,
        }
    }

    /// The payload text handed to the gateway for one channel.
    pub fn for_channel(&self, channel: AlertChannel) -> String {
        match channel {
            AlertChannel::Sms => self.sms_text.clone(),
            AlertChannel::Push => format!("{}\n{}", self.push_title, self.push_body),
            AlertChannel::InApp => self.in_app.to_string(),
            AlertChannel::Qr => self.qr_text.clone(),
        }
    }
}

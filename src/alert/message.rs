//! Subject, HTML and plain-text bodies for an alert.

use super::AlertRequest;
use crate::risk::RiskLevel;
use serde::Serialize;

/// A composed notification, ready for any transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
    pub mine_id: String,
    pub level: RiskLevel,
    pub probability: f64,
}

fn recommended_action(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::Critical => "Evacuate personnel from the affected benches and halt operations until a geotechnical inspection clears the area.",
        RiskLevel::High => "Restrict access to the affected area and increase monitoring frequency.",
        RiskLevel::Medium => "Schedule a geotechnical inspection and review recent readings.",
        RiskLevel::Low => "No action required; continue routine monitoring.",
    }
}

fn level_color(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::Critical => "#b71c1c",
        RiskLevel::High => "#e65100",
        RiskLevel::Medium => "#f9a825",
        RiskLevel::Low => "#2e7d32",
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn compose(request: &AlertRequest, subject_prefix: &str) -> OutboundMessage {
    let level = request.level.as_str().to_uppercase();
    let percent = request.probability * 100.0;
    let subject = format!(
        "{} {} risk at {} ({:.1}%)",
        subject_prefix, level, request.mine_name, percent
    )
    .trim()
    .to_string();

    let place = if request.location.is_empty() {
        request.mine_name.clone()
    } else {
        format!("{}, {}", request.mine_name, request.location)
    };

    let mut text = format!(
        "Risk level: {}\nProbability: {:.1}%\nSite: {} (id {})\n",
        level, percent, place, request.mine_id
    );
    if request.stale_reading {
        text.push_str("Warning: the latest sensor reading is stale; the site may have a sensor outage.\n");
    }
    if !request.drivers.is_empty() {
        text.push_str("Main contributing factors:\n");
        for (feature, share) in request.drivers.iter().take(3) {
            text.push_str(&format!("  - {}: {:.1} points\n", feature.as_str(), share * 100.0));
        }
    }
    text.push_str(&format!("Recommended action: {}\n", recommended_action(request.level)));

    let mut html = format!(
        "<h2 style=\"color:{}\">{} risk at {}</h2>\
         <p><strong>Probability:</strong> {:.1}%<br><strong>Site:</strong> {} (id {})</p>",
        level_color(request.level),
        level,
        escape_html(&request.mine_name),
        percent,
        escape_html(&place),
        escape_html(&request.mine_id),
    );
    if request.stale_reading {
        html.push_str("<p><em>The latest sensor reading is stale; the site may have a sensor outage.</em></p>");
    }
    if !request.drivers.is_empty() {
        html.push_str("<ul>");
        for (feature, share) in request.drivers.iter().take(3) {
            html.push_str(&format!("<li>{}: {:.1} points</li>", feature.as_str(), share * 100.0));
        }
        html.push_str("</ul>");
    }
    html.push_str(&format!(
        "<p><strong>Recommended action:</strong> {}</p>",
        recommended_action(request.level)
    ));

    OutboundMessage {
        to: request.recipient_email.clone(),
        subject,
        html_body: html,
        text_body: text,
        mine_id: request.mine_id.clone(),
        level: request.level,
        probability: request.probability,
    }
}

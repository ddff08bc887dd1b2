//! Default avatars for accounts that never uploaded one.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Produces an avatar (data URI or URL) for a display name.
#[async_trait]
pub trait AvatarGenerator: Send + Sync {
    async fn generate(&self, name: &str) -> Option<String>;
}

/// Two-letter initials on a colored disc, as an SVG data URI.
#[derive(Debug, Default, Clone, Copy)]
pub struct InitialsAvatar;

const PALETTE: [&str; 8] = [
    "#1abc9c", "#3498db", "#9b59b6", "#e67e22", "#e74c3c", "#16a085", "#2c3e50", "#d35400",
];

impl InitialsAvatar {
    fn initials(name: &str) -> String {
        let mut parts = name.split_whitespace();
        let first = parts.next().and_then(|p| p.chars().next());
        let last = parts.last().and_then(|p| p.chars().next());
        let initials = match (first, last) {
            (Some(a), Some(b)) => format!("{a}{b}"),
            (Some(_), None) => name.trim().chars().take(2).collect::<String>(),
            _ => "?".to_string(),
        };
        initials.to_uppercase()
    }

    fn color(name: &str) -> &'static str {
        let sum = name.bytes().fold(0usize, |acc, b| acc.wrapping_add(b as usize));
        PALETTE[sum % PALETTE.len()]
    }

    /// Render the SVG for `name`.
    pub fn svg(name: &str) -> String {
        format!(
            r##"<svg xmlns="http://www.w3.org/2000/svg" width="128" height="128"><circle cx="64" cy="64" r="64" fill="{}"/><text x="64" y="80" font-family="sans-serif" font-size="48" fill="#fff" text-anchor="middle">{}</text></svg>"##,
            Self::color(name),
            xml_escape(&Self::initials(name)),
        )
    }
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[async_trait]
impl AvatarGenerator for InitialsAvatar {
    async fn generate(&self, name: &str) -> Option<String> {
        if name.trim().is_empty() {
            return None;
        }
        let svg = Self::svg(name);
        Some(format!("data:image/svg+xml;base64,{}", STANDARD.encode(svg)))
    }
}

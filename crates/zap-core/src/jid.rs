//! Utilities for normalizing WhatsApp JIDs and deriving display fallbacks.

pub const USER_SERVER: &str = "s.whatsapp.net";
const LEGACY_USER_SERVER: &str = "c.us";

const BRAZIL_COUNTRY_CODE: &str = "55";
const NEWSLETTER_LABEL: &str = "Channel";
const UNKNOWN_LABEL: &str = "Unknown";
const TRUNCATED_LABEL_LEN: usize = 8;

/// The addressing domain a JID lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JidKind {
    User,
    Group,
    Broadcast,
    Newsletter,
    /// Hidden-number identity (`@lid`).
    Lid,
}

impl JidKind {
    pub fn of(jid: &str) -> Self {
        match jid.trim().rsplit_once('@').map(|(_, server)| server) {
            Some("g.us") => JidKind::Group,
            Some("broadcast") => JidKind::Broadcast,
            Some("newsletter") => JidKind::Newsletter,
            Some("lid") => JidKind::Lid,
            _ => JidKind::User,
        }
    }
}

pub fn is_group(jid: &str) -> bool {
    JidKind::of(jid) == JidKind::Group
}

/// Canonical form of a JID: device suffix stripped, default server applied.
///
/// `"5511999999999:12@s.whatsapp.net"` and `"5511999999999"` both become
/// `"5511999999999@s.whatsapp.net"`. Blank input yields an empty string.
pub fn normalize(jid: &str) -> String {
    let jid = jid.trim();
    let (user, server) = jid.split_once('@').unwrap_or((jid, USER_SERVER));
    let user = strip_device(user);
    if user.is_empty() {
        return String::new();
    }

    let server = match server {
        "" | LEGACY_USER_SERVER => USER_SERVER,
        other => other,
    };
    format!("{user}@{server}")
}

/// The phone number embedded in a JID, or an empty string when the user part
/// is not purely numeric.
pub fn phone_of(jid: &str) -> String {
    let user = user_part(jid);
    if !user.is_empty() && user.chars().all(|c| c.is_ascii_digit()) {
        user.to_string()
    } else {
        String::new()
    }
}

/// Synthesized name used when no directory source knows the JID.
pub fn fallback_name(jid: &str) -> String {
    let user = user_part(jid);
    let label = match JidKind::of(jid) {
        JidKind::Group => user.rsplit('-').next().unwrap_or(user).to_string(),
        JidKind::Newsletter => NEWSLETTER_LABEL.to_string(),
        JidKind::Broadcast | JidKind::Lid => truncated_label(user),
        JidKind::User => {
            let phone = phone_of(jid);
            if phone.is_empty() {
                user.to_string()
            } else {
                format_phone(&phone)
            }
        }
    };

    match (label.is_empty(), jid.trim()) {
        (false, _) => label,
        (true, "") => UNKNOWN_LABEL.to_string(),
        (true, raw) => raw.to_string(),
    }
}

/// Format a phone number string for display.
///
/// Brazilian numbers drop the country code: `"5511987654321"` becomes
/// `"(11) 98765-4321"` and `"551133334444"` becomes `"(11) 3333-4444"`.
/// Anything else is shown as `+<digits>`.
pub fn format_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return phone.to_string();
    }

    if let Some(national) = digits.strip_prefix(BRAZIL_COUNTRY_CODE) {
        let (area, local) = national.split_at(national.len().min(2));
        match national.len() {
            // Mobile with 9 digits
            11 => return format!("({}) {}-{}", area, &local[..5], &local[5..]),
            // Landline with 8 digits
            10 => return format!("({}) {}-{}", area, &local[..4], &local[4..]),
            _ => {}
        }
    }

    format!("+{}", digits)
}

fn user_part(jid: &str) -> &str {
    let jid = jid.trim();
    let user = jid.split('@').next().unwrap_or(jid);
    strip_device(user)
}

fn strip_device(user: &str) -> &str {
    user.split(':').next().unwrap_or(user)
}

fn truncated_label(user: &str) -> String {
    if user.chars().count() <= TRUNCATED_LABEL_LEN {
        return user.to_string();
    }
    let head: String = user.chars().take(TRUNCATED_LABEL_LEN).collect();
    format!("{}…", head)
}

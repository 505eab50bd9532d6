//! User-facing message templates (HTML parse mode).

/// Escape text for inclusion in an HTML-mode Telegram message.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Clickable mention that works for users without a username.
pub fn html_mention(user_id: i64, display_name: &str) -> String {
    format!(
        "<a href=\"tg://user?id={user_id}\">{}</a>",
        escape(display_name)
    )
}

pub fn render_welcome(user_id: i64, display_name: &str) -> String {
    format!(
        "Hello {}, welcome to the group!\n\n\
         For now you can only read. To get posting rights, press the button \
         below and confirm you accept the group rules.",
        html_mention(user_id, display_name)
    )
}

pub fn render_reminder(user_id: i64, display_name: &str) -> String {
    format!(
        "⚠️ {} has not confirmed the rules yet. Please press the button below \
         and complete the short task — posting unlocks right after.",
        html_mention(user_id, display_name)
    )
}

pub fn render_rules(magic_word: &str) -> String {
    format!(
        "Please follow these group rules:\n\n\
         - stay on topic;\n\
         - no insults or harassment;\n\
         - no unsolicited advertising of channels, groups, bots or products;\n\
         - no adding bots without admin approval.\n\n\
         If you agree, send the word <b>{}</b> right now. Any action against \
         the rules may lead to restrictions.",
        escape(magic_word)
    )
}

pub fn render_success(user_id: i64, display_name: &str) -> String {
    format!(
        "We have a new member!\n{} just accepted the group rules.",
        html_mention(user_id, display_name)
    )
}

/// DM sent after a successful confirmation.
pub const DM_SUCCESS_TEXT: &str =
    "Thanks for accepting the rules. You can post in the group now.";

/// Alert shown when somebody presses a button that is not theirs.
pub const ALERT_TEXT: &str =
    "That button belongs to someone else ;)\n\nDon't worry, yours will come.";

/// Reply to a plain /start in a private chat with no active session.
pub const START_NO_SESSION_TEXT: &str =
    "Hi! There is no active verification session for you right now. \
     Please follow the instructions in the group and try again.";

pub fn render_mute_notice(user_id: i64, display_name: &str, until: &str) -> String {
    format!(
        "{} has been restricted from posting until {until} for a prohibited \
         topic in this group.",
        html_mention(user_id, display_name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_handles_html_specials() {
        assert_eq!(escape("a<b>&\"c\""), "a&lt;b&gt;&amp;&quot;c&quot;");
    }

    #[test]
    fn mention_escapes_display_name() {
        let m = html_mention(7, "Eve <script>");
        assert!(m.contains("tg://user?id=7"));
        assert!(m.contains("&lt;script&gt;"));
        assert!(!m.contains("<script>"));
    }

    #[test]
    fn rules_bold_the_magic_word() {
        let text = render_rules("apricot");
        assert!(text.contains("<b>apricot</b>"));
    }

    #[test]
    fn rules_escape_the_magic_word() {
        let text = render_rules("a<b");
        assert!(text.contains("<b>a&lt;b</b>"));
    }
}

//! JavaScript snippets evaluated on the portal page.
//!
//! Every user-provided value is sanitized and injected only into string
//! literals, never into code positions. All wizard snippets act on the
//! visible modal and fall back to the document when no modal is found.

use guidewalk::types::Domain;

const MODAL: &str =
    r#"document.querySelector('.modal.show, .modal[style*="display: block"], [role="dialog"]') || document"#;

pub const GUIDE_BUTTON_LABEL: &str = "入力ガイド";

/// Position of the line guide among the page's guide buttons.
pub const LINE_GUIDE_INDEX: usize = 3;

/// Fill the login form and press its button. Yields `true` when a login
/// button was found.
pub fn login(username: &str, password: &str) -> String {
    format!(
        r#"(() => {{
            for (const input of document.querySelectorAll('input')) {{
                if (input.type === 'text') {{
                    input.value = '{user}';
                    input.dispatchEvent(new Event('input', {{ bubbles: true }}));
                }}
                if (input.type === 'password') {{
                    input.value = '{pass}';
                    input.dispatchEvent(new Event('input', {{ bubbles: true }}));
                }}
            }}
            for (const cb of document.querySelectorAll('input[type="checkbox"]')) {{
                if (!cb.checked) cb.click();
            }}
            for (const btn of document.querySelectorAll('button')) {{
                if (btn.textContent && btn.textContent.includes('ログイン')) {{
                    btn.click();
                    return true;
                }}
            }}
            return false;
        }})()"#,
        user = sanitize_js_string(username),
        pass = sanitize_js_string(password),
    )
}

/// Whether the page still shows a password field.
pub fn login_form_present() -> String {
    r#"document.querySelector('input[type="password"]') !== null"#.to_string()
}

/// Press the rental property search entry.
pub fn open_rental_search() -> String {
    r#"(() => {
        for (const btn of document.querySelectorAll('button')) {
            const text = btn.textContent || '';
            if (text.includes('賃貸') && text.includes('物件検索')) {
                btn.click();
                return true;
            }
        }
        return false;
    })()"#
        .to_string()
}

/// Press the guide button for `domain`.
///
/// The location guide is the one next to the prefecture/location field,
/// else the first guide button; the line guide is the fourth.
pub fn open_guide(domain: Domain) -> String {
    let label = sanitize_js_string(GUIDE_BUTTON_LABEL);
    match domain {
        Domain::Location => format!(
            r#"(() => {{
                const guides = [...document.querySelectorAll('button')]
                    .filter(b => (b.textContent || '').trim() === '{label}');
                const near = guides.find(b => {{
                    const row = b.closest('tr, div, td');
                    const text = row ? row.textContent || '' : '';
                    return text.includes('都道府県') || text.includes('所在地');
                }});
                const target = near || guides[0];
                if (!target) return false;
                target.click();
                return true;
            }})()"#
        ),
        Domain::Line => format!(
            r#"(() => {{
                const guides = [...document.querySelectorAll('button')]
                    .filter(b => (b.textContent || '').trim() === '{label}');
                const target = guides[{LINE_GUIDE_INDEX}];
                if (!target) return false;
                target.click();
                return true;
            }})()"#
        ),
    }
}

/// Options of the `slot`-th select in the modal as `[{value, label, disabled}]`.
pub fn read_options(slot: usize) -> String {
    format!(
        r#"(() => {{
            const modal = {MODAL};
            const select = modal.querySelectorAll('select')[{slot}];
            if (!select) return [];
            return [...select.options].map(o => ({{
                value: o.value || '',
                label: (o.text || '').trim(),
                disabled: !!o.disabled,
            }}));
        }})()"#
    )
}

/// Select the option with `value` in the `slot`-th select and fire `change`.
pub fn select_option(slot: usize, value: &str) -> String {
    format!(
        r#"(() => {{
            const modal = {MODAL};
            const select = modal.querySelectorAll('select')[{slot}];
            if (!select) return false;
            const options = [...select.options];
            const index = options.findIndex(o => o.value === '{value}');
            if (index < 0 || options[index].disabled) return false;
            select.selectedIndex = index;
            select.dispatchEvent(new Event('change', {{ bubbles: true }}));
            return true;
        }})()"#,
        value = sanitize_js_string(value),
    )
}

/// Press the modal button labelled `label`; an exact label wins over a
/// partial one.
pub fn trigger(label: &str) -> String {
    format!(
        r#"(() => {{
            const modal = {MODAL};
            const wanted = '{label}';
            const buttons = [...modal.querySelectorAll('button, input[type="button"], input[type="submit"]')];
            const text = b => ((b.textContent || '').trim() || (b.value || '').trim());
            const target = buttons.find(b => text(b) === wanted) || buttons.find(b => text(b).includes(wanted));
            if (!target || target.disabled) return false;
            target.click();
            return true;
        }})()"#,
        label = sanitize_js_string(label),
    )
}

/// Dismiss the modal through the first of `labels` present, else its close
/// control.
pub fn close_guide(labels: &[&str]) -> String {
    let labels = labels
        .iter()
        .map(|l| format!("'{}'", sanitize_js_string(l)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"(() => {{
            const modal = {MODAL};
            const labels = [{labels}];
            for (const btn of modal.querySelectorAll('button, input[type="button"]')) {{
                const text = (btn.textContent || '').trim() || (btn.value || '').trim();
                if (labels.includes(text)) {{
                    btn.click();
                    return true;
                }}
            }}
            const close = modal.querySelector('button.close, .btn-close, [data-dismiss="modal"]');
            if (close) {{
                close.click();
                return true;
            }}
            return false;
        }})()"#
    )
}

/// Sanitize a string for safe injection into a JavaScript string literal.
///
/// Escapes backslashes, quotes, backticks and line breaks, strips null
/// bytes, and hex-escapes angle brackets so a value can never close a
/// `<script>` element.
pub fn sanitize_js_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 8);
    for ch in s.chars() {
        match ch {
            '\\' => result.push_str("\\\\"),
            '\'' => result.push_str("\\'"),
            '"' => result.push_str("\\\""),
            '`' => result.push_str("\\`"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            '\0' => {}
            '<' => result.push_str("\\x3c"),
            '>' => result.push_str("\\x3e"),
            _ => result.push(ch),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_quotes_and_breaks() {
        assert_eq!(sanitize_js_string("芝一丁目"), "芝一丁目");
        assert_eq!(sanitize_js_string("it's"), "it\\'s");
        assert_eq!(sanitize_js_string("a\nb"), "a\\nb");
        assert_eq!(sanitize_js_string("abc\0def"), "abcdef");
    }

    #[test]
    fn test_sanitize_script_close() {
        let sanitized = sanitize_js_string("</script><script>alert(1)</script>");
        assert!(!sanitized.contains("</script>"));
        assert!(sanitized.contains("\\x3c/script\\x3e"));
    }

    #[test]
    fn test_password_cannot_escape_literal() {
        let js = login("agent", "p'; fetch('//evil'); '");
        assert!(js.contains("p\\'; fetch(\\'//evil\\'); \\'"));
    }

    #[test]
    fn test_slot_and_value_injected() {
        let js = select_option(2, "003");
        assert!(js.contains("querySelectorAll('select')[2]"));
        assert!(js.contains("o.value === '003'"));
        assert!(read_options(1).contains("querySelectorAll('select')[1]"));
    }

    #[test]
    fn test_guide_buttons_per_domain() {
        assert!(open_guide(Domain::Location).contains("所在地"));
        assert!(open_guide(Domain::Line).contains("guides[3]"));
    }

    #[test]
    fn test_close_guide_lists_labels() {
        let js = close_guide(&["キャンセル", "閉じる"]);
        assert!(js.contains("['キャンセル', '閉じる']"));
    }
}

//! Scrapers for the HTML pages served by SASLogon.

use once_cell::sync::Lazy;
use regex::Regex;

static HIDDEN_INPUT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<input[^>]*"hidden"[^>]*>"#).unwrap());
static INPUT_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<input[^>]*>").unwrap());
static NAME_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"name="([^"]*)"\s+value="([^"]*)""#).unwrap());
static INFO_BOX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)class="infobox".*?<h4[^>]*>(.*?)</h4>"#).unwrap());

/// Finds a form whose action URL contains `marker` and returns that URL.
pub fn extract_form_action(html: &str, marker: &str) -> Option<String> {
    let pattern = format!(r#"<form[^>]+action="([^"]*{}[^"]*)""#, regex::escape(marker));
    let form = Regex::new(&pattern).ok()?;
    form.captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Collects the hidden input fields of a login page as name/value pairs.
pub fn extract_hidden_fields(html: &str) -> Vec<(String, String)> {
    HIDDEN_INPUT
        .find_iter(html)
        .filter_map(|tag| name_value(tag.as_str()))
        .collect()
}

/// Collects every named input field of a form, hidden or not.
pub fn extract_input_fields(html: &str) -> Vec<(String, String)> {
    INPUT_TAG
        .find_iter(html)
        .filter_map(|tag| name_value(tag.as_str()))
        .collect()
}

/// Pulls the heading text out of the info box on an authorization page.
pub fn extract_info_box(html: &str) -> Option<String> {
    let caps = INFO_BOX.captures(html)?;
    let text = caps.get(1)?.as_str().trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn name_value(tag: &str) -> Option<(String, String)> {
    let caps = NAME_VALUE.captures(tag)?;
    Some((
        caps.get(1)?.as_str().to_string(),
        caps.get(2)?.as_str().to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_form_action_matches_marker() {
        let html = r#"<html><form method="post" action="/SASLogon/login.do?one=1"><input/></form></html>"#;
        assert_eq!(
            extract_form_action(html, "Logon"),
            Some("/SASLogon/login.do?one=1".to_string())
        );
    }

    #[test]
    fn test_extract_form_action_respects_marker() {
        let html = r#"<form action="/SASLogon/oauth/authorize"></form>"#;
        assert_eq!(
            extract_form_action(html, "SASLogon/oauth/authorize"),
            Some("/SASLogon/oauth/authorize".to_string())
        );
        assert_eq!(extract_form_action(html, "Logout"), None);
    }

    #[test]
    fn test_extract_form_action_none_without_form() {
        assert_eq!(extract_form_action("<html><body>hi</body></html>", "Logon"), None);
    }

    #[test]
    fn test_extract_hidden_fields_skips_visible_inputs() {
        let html = concat!(
            r#"<input type="hidden" name="_csrf" value="abc123"/>"#,
            r#"<input type="text" name="username" value=""/>"#,
            r#"<input type="hidden" name="execution" value="e1s1"/>"#,
        );
        assert_eq!(
            extract_hidden_fields(html),
            vec![
                ("_csrf".to_string(), "abc123".to_string()),
                ("execution".to_string(), "e1s1".to_string()),
            ]
        );
    }

    #[test]
    fn test_extract_input_fields_includes_visible() {
        let html = concat!(
            r#"<input type="hidden" name="_csrf" value="abc123"/>"#,
            r#"<input type="text" name="username" value="secretuser"/>"#,
        );
        assert_eq!(
            extract_input_fields(html),
            vec![
                ("_csrf".to_string(), "abc123".to_string()),
                ("username".to_string(), "secretuser".to_string()),
            ]
        );
    }

    #[test]
    fn test_extract_info_box() {
        let html = concat!(
            r#"<div class="infobox">"#,
            "\n  <h4>\n    jERs0Ds1zK\n  </h4>\n</div>",
        );
        assert_eq!(extract_info_box(html), Some("jERs0Ds1zK".to_string()));
    }

    #[test]
    fn test_extract_info_box_empty_heading() {
        let html = r#"<div class="infobox"><h4>   </h4></div>"#;
        assert_eq!(extract_info_box(html), None);
    }
}

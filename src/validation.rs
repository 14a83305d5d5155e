//! Input validation for tool parameters
//!
//! `serde` enforces shape and types while deserializing; this module checks
//! the remaining bounds and formats. Each input type lists its constraints in
//! a [`Validate`] impl, and a [`Violations`] collector gathers every failure so
//! a rejected call names all offending fields at once. Validation always runs
//! before any request reaches the JMAP server.

use std::fmt::Display;
use std::sync::LazyLock;

use chrono::DateTime;
use regex::Regex;

use crate::errors::{AppError, AppResult};
use crate::models::{
    DeleteEmailsInput, EmailAddress, GetEmailsInput, GetMailboxesInput, GetThreadsInput,
    MarkEmailsInput, MoveEmailsInput, ReplyToEmailInput, SearchEmailsInput, SendEmailInput,
};

/// Maximum `limit` for `search_emails`
pub const MAX_SEARCH_LIMIT: u32 = 100;
/// Maximum `limit` for `get_mailboxes`
pub const MAX_MAILBOX_LIMIT: u32 = 200;
/// Maximum ids per `get_emails` call
pub const MAX_GET_EMAIL_IDS: usize = 50;
/// Maximum ids per `get_threads` call
pub const MAX_GET_THREAD_IDS: usize = 20;
/// Maximum ids per mark/move/delete call
pub const MAX_MUTATION_IDS: usize = 100;
/// Maximum characters in a free-text search field
const MAX_SEARCH_TEXT_CHARS: usize = 1_000;
/// Maximum length of a JMAP id or keyword
const MAX_ID_LEN: usize = 255;

static EMAIL_PATTERN: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$",
    )
});

/// Collected constraint failures for one tool input
#[derive(Debug, Default)]
pub struct Violations(Vec<String>);

impl Violations {
    pub fn push(&mut self, field: &str, problem: impl Display) {
        self.0.push(format!("{field} {problem}"));
    }

    /// Value within an inclusive range
    pub fn range<T>(&mut self, field: &str, value: T, min: T, max: T)
    where
        T: PartialOrd + Display,
    {
        if value < min || value > max {
            self.push(field, format_args!("must be in range {min}..{max}, got {value}"));
        }
    }

    /// List of JMAP ids with a length bound
    pub fn ids(&mut self, field: &str, ids: &[String], min: usize, max: usize) {
        if ids.len() < min || ids.len() > max {
            self.push(
                field,
                format_args!("must contain {min}..{max} ids, got {}", ids.len()),
            );
        }
        for (i, id) in ids.iter().enumerate() {
            self.id(&format!("{field}[{i}]"), id);
        }
    }

    /// JMAP id: 1..255 characters of `[A-Za-z0-9_-]`
    pub fn id(&mut self, field: &str, id: &str) {
        if id.is_empty() || id.len() > MAX_ID_LEN {
            self.push(field, format_args!("must be 1..{MAX_ID_LEN} characters"));
        } else if !id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
        {
            self.push(field, "must match [A-Za-z0-9_-]+");
        }
    }

    /// JMAP keyword: printable ASCII without the reserved characters
    pub fn keyword(&mut self, field: &str, keyword: Option<&str>) {
        let Some(keyword) = keyword else { return };
        if keyword.is_empty() || keyword.len() > MAX_ID_LEN {
            self.push(field, format_args!("must be 1..{MAX_ID_LEN} characters"));
        } else if keyword.chars().any(|ch| {
            !ch.is_ascii_graphic() || matches!(ch, '(' | ')' | '{' | ']' | '%' | '*' | '"' | '\\')
        }) {
            self.push(field, "contains characters not allowed in a keyword");
        }
    }

    /// Optional free-text search field
    pub fn text(&mut self, field: &str, value: Option<&str>) {
        let Some(value) = value else { return };
        let chars = value.chars().count();
        if chars == 0 || chars > MAX_SEARCH_TEXT_CHARS {
            self.push(
                field,
                format_args!("must be 1..{MAX_SEARCH_TEXT_CHARS} characters"),
            );
        }
    }

    /// Optional ISO-8601 (RFC 3339) datetime
    pub fn datetime(&mut self, field: &str, value: Option<&str>) {
        let Some(value) = value else { return };
        if DateTime::parse_from_rfc3339(value).is_err() {
            self.push(
                field,
                format_args!("must be an ISO-8601 datetime (e.g. 2025-01-31T00:00:00Z), got '{value}'"),
            );
        }
    }

    /// Single address with a syntactically valid email
    pub fn address(&mut self, field: &str, address: &EmailAddress) {
        let valid = match &*EMAIL_PATTERN {
            Ok(pattern) => pattern.is_match(&address.email),
            Err(_) => false,
        };
        if !valid {
            self.push(
                &format!("{field}.email"),
                format_args!("must be a valid email address, got '{}'", address.email),
            );
        }
    }

    /// Address list with a minimum length
    pub fn addresses(&mut self, field: &str, addresses: &[EmailAddress], min: usize) {
        if addresses.len() < min {
            self.push(field, format_args!("must contain at least {min} address(es)"));
        }
        for (i, address) in addresses.iter().enumerate() {
            self.address(&format!("{field}[{i}]"), address);
        }
    }

    /// Convert into `Ok` or a single `InvalidInput` naming every failure
    pub fn finish(self) -> AppResult<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(AppError::InvalidInput(self.0.join("; ")))
        }
    }
}

/// Constraint description for a tool input
pub trait Validate {
    /// Record every violated constraint
    fn collect(&self, violations: &mut Violations);

    /// Run all constraints
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` listing each offending field.
    fn validate(&self) -> AppResult<()> {
        let mut violations = Violations::default();
        self.collect(&mut violations);
        violations.finish()
    }
}

impl Validate for SearchEmailsInput {
    fn collect(&self, v: &mut Violations) {
        v.range("limit", self.limit, 1, MAX_SEARCH_LIMIT);
        for (field, value) in [
            ("query", &self.query),
            ("from", &self.from),
            ("to", &self.to),
            ("cc", &self.cc),
            ("bcc", &self.bcc),
            ("subject", &self.subject),
            ("body", &self.body),
        ] {
            v.text(field, value.as_deref());
        }
        if let Some(mailbox) = &self.in_mailbox {
            v.id("inMailbox", mailbox);
        }
        for (field, value) in [
            ("hasKeyword", &self.has_keyword),
            ("notKeyword", &self.not_keyword),
            ("allInThreadHaveKeyword", &self.all_in_thread_have_keyword),
            ("someInThreadHaveKeyword", &self.some_in_thread_have_keyword),
            ("noneInThreadHaveKeyword", &self.none_in_thread_have_keyword),
        ] {
            v.keyword(field, value.as_deref());
        }
        v.datetime("before", self.before.as_deref());
        v.datetime("after", self.after.as_deref());
        if let (Some(min), Some(max)) = (self.min_size, self.max_size)
            && min > max
        {
            v.push("minSize", "must be <= maxSize");
        }
    }
}

impl Validate for GetEmailsInput {
    fn collect(&self, v: &mut Violations) {
        v.ids("ids", &self.ids, 1, MAX_GET_EMAIL_IDS);
        if let Some(properties) = &self.properties
            && properties.is_empty()
        {
            v.push("properties", "must not be empty when supplied");
        }
        if self.max_body_value_bytes == Some(0) {
            v.push("maxBodyValueBytes", "must be at least 1");
        }
    }
}

impl Validate for GetMailboxesInput {
    fn collect(&self, v: &mut Violations) {
        v.range("limit", self.limit, 1, MAX_MAILBOX_LIMIT);
        if let Some(parent) = &self.parent_id {
            v.id("parentId", parent);
        }
    }
}

impl Validate for GetThreadsInput {
    fn collect(&self, v: &mut Violations) {
        v.ids("ids", &self.ids, 1, MAX_GET_THREAD_IDS);
    }
}

impl Validate for MarkEmailsInput {
    fn collect(&self, v: &mut Violations) {
        v.ids("ids", &self.ids, 1, MAX_MUTATION_IDS);
    }
}

impl Validate for MoveEmailsInput {
    fn collect(&self, v: &mut Violations) {
        v.ids("ids", &self.ids, 1, MAX_MUTATION_IDS);
        v.id("mailboxId", &self.mailbox_id);
    }
}

impl Validate for DeleteEmailsInput {
    fn collect(&self, v: &mut Violations) {
        v.ids("ids", &self.ids, 1, MAX_MUTATION_IDS);
    }
}

impl Validate for SendEmailInput {
    fn collect(&self, v: &mut Violations) {
        v.addresses("to", &self.to, 1);
        v.addresses("cc", self.cc.as_deref().unwrap_or_default(), 0);
        v.addresses("bcc", self.bcc.as_deref().unwrap_or_default(), 0);
        if let Some(from) = &self.from {
            v.address("from", from);
        }
        if let Some(identity) = &self.identity_id {
            v.id("identityId", identity);
        }
    }
}

impl Validate for ReplyToEmailInput {
    fn collect(&self, v: &mut Violations) {
        v.id("emailId", &self.email_id);
        if let Some(from) = &self.from {
            v.address("from", from);
        }
        if let Some(identity) = &self.identity_id {
            v.id("identityId", identity);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        MAX_GET_EMAIL_IDS, MAX_GET_THREAD_IDS, MAX_MAILBOX_LIMIT, MAX_MUTATION_IDS, Validate,
        Violations,
    };
    use crate::models::{
        DeleteEmailsInput, EmailAddress, GetEmailsInput, GetMailboxesInput, GetThreadsInput,
        MarkEmailsInput, MoveEmailsInput, SearchEmailsInput, SendEmailInput,
    };

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("T{i}")).collect()
    }

    #[test]
    fn get_threads_rejects_empty_and_oversized_id_lists() {
        let err = GetThreadsInput { ids: ids(0) }
            .validate()
            .expect_err("must fail");
        assert!(err.to_string().contains("ids must contain 1..20 ids, got 0"));

        let err = GetThreadsInput { ids: ids(21) }
            .validate()
            .expect_err("must fail");
        assert!(err.to_string().contains("got 21"));

        GetThreadsInput { ids: ids(20) }
            .validate()
            .expect("20 ids are allowed");
    }

    #[test]
    fn bound_constants_match_documented_limits() {
        assert_eq!(MAX_GET_EMAIL_IDS, 50);
        assert_eq!(MAX_GET_THREAD_IDS, 20);
        assert_eq!(MAX_MUTATION_IDS, 100);
        assert_eq!(MAX_MAILBOX_LIMIT, 200);
    }

    #[test]
    fn id_list_bounds_are_enforced_for_every_tool() {
        type Check = fn(Vec<String>) -> bool;
        let cases: [(&str, Check, usize); 5] = [
            ("get_emails", |ids| {
                GetEmailsInput {
                    ids,
                    properties: None,
                    fetch_text_body_values: None,
                    fetch_html_body_values: None,
                    max_body_value_bytes: None,
                }
                .validate()
                .is_ok()
            }, 50),
            ("get_threads", |ids| GetThreadsInput { ids }.validate().is_ok(), 20),
            ("mark_emails", |ids| {
                MarkEmailsInput {
                    ids,
                    seen: Some(true),
                    flagged: None,
                }
                .validate()
                .is_ok()
            }, 100),
            ("move_emails", |ids| {
                MoveEmailsInput {
                    ids,
                    mailbox_id: "M1".to_owned(),
                }
                .validate()
                .is_ok()
            }, 100),
            ("delete_emails", |ids| DeleteEmailsInput { ids }.validate().is_ok(), 100),
        ];

        for (tool, accepts, max) in cases {
            for (len, ok) in [(0, false), (1, true), (max, true), (max + 1, false)] {
                assert_eq!(accepts(ids(len)), ok, "{tool} with {len} ids");
            }
        }
    }

    #[test]
    fn mailbox_limit_bounds_are_enforced() {
        for (limit, ok) in [(0, false), (1, true), (200, true), (201, false)] {
            let input = GetMailboxesInput {
                parent_id: None,
                limit,
                position: 0,
            };
            assert_eq!(input.validate().is_ok(), ok, "limit {limit}");
        }
    }

    #[test]
    fn search_text_fields_are_capped_at_1000_chars() {
        let at_cap = SearchEmailsInput {
            limit: 10,
            subject: Some("x".repeat(1_000)),
            ..Default::default()
        };
        at_cap.validate().expect("1000 characters are allowed");

        let over = SearchEmailsInput {
            limit: 10,
            subject: Some("x".repeat(1_001)),
            body: Some(String::new()),
            ..Default::default()
        };
        let msg = over.validate().expect_err("must fail").to_string();
        assert!(msg.contains("subject must be 1..1000 characters"));
        assert!(msg.contains("body must be 1..1000 characters"));
    }

    #[test]
    fn search_limit_bounds_are_enforced() {
        for (limit, ok) in [(0, false), (1, true), (100, true), (101, false)] {
            let input = SearchEmailsInput {
                limit,
                ..Default::default()
            };
            assert_eq!(input.validate().is_ok(), ok, "limit {limit}");
        }
    }

    #[test]
    fn search_rejects_non_iso_datetimes_and_names_field() {
        let input: SearchEmailsInput = serde_json::from_value(json!({
            "before": "2025-01-31",
            "after": "2025-01-01T00:00:00Z"
        }))
        .expect("parses");
        let err = input.validate().expect_err("must fail");
        let msg = err.to_string();
        assert!(msg.contains("before must be an ISO-8601 datetime"));
        assert!(!msg.contains("after"));
    }

    #[test]
    fn violations_report_every_offending_field() {
        let input = MoveEmailsInput {
            ids: vec!["ok".to_owned(), "bad id".to_owned()],
            mailbox_id: String::new(),
        };
        let msg = input.validate().expect_err("must fail").to_string();
        assert!(msg.contains("ids[1] must match [A-Za-z0-9_-]+"));
        assert!(msg.contains("mailboxId must be 1..255 characters"));
    }

    #[test]
    fn send_requires_valid_recipients() {
        let input = SendEmailInput {
            to: vec![],
            cc: Some(vec![EmailAddress {
                name: Some("Bob".to_owned()),
                email: "not-an-address".to_owned(),
            }]),
            bcc: None,
            subject: "Hi".to_owned(),
            text_body: Some("hello".to_owned()),
            html_body: None,
            from: None,
            identity_id: None,
        };
        let msg = input.validate().expect_err("must fail").to_string();
        assert!(msg.contains("to must contain at least 1 address(es)"));
        assert!(msg.contains("cc[0].email must be a valid email address"));
    }

    #[test]
    fn address_pattern_accepts_common_forms() {
        let mut v = Violations::default();
        for email in ["a@x.com", "first.last+tag@sub.example.org", "o'neil@example.co.uk"] {
            v.address(
                "to",
                &EmailAddress {
                    name: None,
                    email: email.to_owned(),
                },
            );
        }
        v.finish().expect("all addresses are valid");
    }

    #[test]
    fn keywords_reject_reserved_characters() {
        let mut v = Violations::default();
        v.keyword("hasKeyword", Some("$seen"));
        v.keyword("notKeyword", Some("bad keyword"));
        v.keyword("someInThreadHaveKeyword", Some("odd*"));
        let msg = v.finish().expect_err("must fail").to_string();
        assert!(!msg.contains("hasKeyword"));
        assert!(msg.contains("notKeyword"));
        assert!(msg.contains("someInThreadHaveKeyword"));
    }
}

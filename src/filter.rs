//! Email filter construction for `Email/query`
//!
//! Translates a validated search request into a sparse JMAP
//! `FilterCondition`. Only the fields the caller supplied are emitted, and a
//! request with no filter fields produces no filter at all.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::models::SearchEmailsInput;

/// JMAP `Email/query` filter condition (sparse)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bcc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_mailbox: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_keyword: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_keyword: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_attachment: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_in_thread_have_keyword: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub some_in_thread_have_keyword: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub none_in_thread_have_keyword: Option<String>,
}

/// Mailbox query filter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MailboxFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Build the `Email/query` filter for a search request
///
/// Returns `None` when no filter field was supplied, so the query is sent
/// without a `filter` key. `query` maps to `text`; every other field maps to
/// the filter key of the same name.
pub fn build_email_filter(input: &SearchEmailsInput) -> Option<EmailFilter> {
    let filter = EmailFilter {
        text: input.query.clone(),
        from: input.from.clone(),
        to: input.to.clone(),
        cc: input.cc.clone(),
        bcc: input.bcc.clone(),
        subject: input.subject.clone(),
        body: input.body.clone(),
        in_mailbox: input.in_mailbox.clone(),
        has_keyword: input.has_keyword.clone(),
        not_keyword: input.not_keyword.clone(),
        before: input.before.as_deref().map(to_utc_date),
        after: input.after.as_deref().map(to_utc_date),
        min_size: input.min_size,
        max_size: input.max_size,
        has_attachment: input.has_attachment,
        all_in_thread_have_keyword: input.all_in_thread_have_keyword.clone(),
        some_in_thread_have_keyword: input.some_in_thread_have_keyword.clone(),
        none_in_thread_have_keyword: input.none_in_thread_have_keyword.clone(),
    };
    (filter != EmailFilter::default()).then_some(filter)
}

/// Build the `Mailbox/query` filter scoped to a parent mailbox
pub fn build_mailbox_filter(parent_id: Option<&str>) -> Option<MailboxFilter> {
    parent_id.map(|id| MailboxFilter {
        parent_id: Some(id.to_owned()),
        role: None,
    })
}

/// Normalize an RFC 3339 datetime to the JMAP `UTCDate` form
///
/// Values that fail to parse pass through unchanged; they are rejected by
/// validation before a filter is built.
fn to_utc_date(value: &str) -> String {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| {
            dt.with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::AutoSi, true)
        })
        .unwrap_or_else(|_| value.to_owned())
}

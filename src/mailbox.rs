//! Newsletter retrieval via raw IMAP over TLS.
//!
//! Searches the inbox for each configured newsletter source, fetches the
//! matching messages, and extracts their HTML bodies. The IMAP session is
//! blocking; callers on the async runtime wrap `MailboxReader::fetch` in
//! `spawn_blocking`.

use std::collections::HashSet;
use std::io::Write as IoWrite;
use std::net::TcpStream;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{Days, Utc};
use mail_parser::MessageParser;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use crate::error::{ConfigError, MailboxError, Result};

// ── Configuration ───────────────────────────────────────────────────

/// IMAP connection settings.
#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
}

/// One newsletter to pull from the mailbox, matched by sender address
/// and (optionally) sender display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsletterSource {
    pub name: String,
    pub email: String,
}

/// A fetched mailbox message before any content extraction.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub uid: u32,
    pub sender: String,
    pub subject: String,
    /// HTML body, if the message carries a real `text/html` part.
    pub html: Option<String>,
}

/// Cap per newsletter search. UID SEARCH returns ascending UIDs, so the
/// cap keeps the oldest messages in the window.
const MAX_MESSAGES_PER_SOURCE: usize = 100;

static NEWER_THAN_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+[dmy]$").unwrap());

/// Build an IMAP SEARCH query for one newsletter source.
///
/// `newer_than` is a number followed by `d` (day), `m` (month) or `y`
/// (year), e.g. `7d`. Months count as 30 days and years as 365.
pub fn build_search_query(
    source: &NewsletterSource,
    newer_than: &str,
) -> std::result::Result<String, ConfigError> {
    let normalized = newer_than.trim().to_lowercase();
    if !NEWER_THAN_FORMAT.is_match(&normalized) {
        return Err(ConfigError::InvalidValue {
            key: "DIGEST_NEWER_THAN".to_string(),
            message: "must be a number followed by 'd', 'm', or 'y' (e.g., 4d, 9m, 1y)"
                .to_string(),
        });
    }

    let (count, unit) = normalized.split_at(normalized.len() - 1);
    let count: u64 = count.parse().map_err(|_| ConfigError::InvalidValue {
        key: "DIGEST_NEWER_THAN".to_string(),
        message: "window is too large".to_string(),
    })?;
    let days_per_unit = match unit {
        "d" => 1,
        "m" => 30,
        _ => 365,
    };
    let since = count
        .checked_mul(days_per_unit)
        .and_then(|days| Utc::now().date_naive().checked_sub_days(Days::new(days)))
        .ok_or_else(|| ConfigError::InvalidValue {
            key: "DIGEST_NEWER_THAN".to_string(),
            message: "window is too large".to_string(),
        })?;

    let mut query = format!(
        "SINCE {} FROM \"{}\"",
        since.format("%d-%b-%Y"),
        imap_quote(&source.email)
    );
    if !source.name.trim().is_empty() {
        query.push_str(&format!(" FROM \"{}\"", imap_quote(source.name.trim())));
    }
    Ok(query)
}

fn imap_quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

// ── Reader ──────────────────────────────────────────────────────────

/// Fetches newsletter messages from an IMAP mailbox.
pub struct MailboxReader {
    config: ImapConfig,
}

impl MailboxReader {
    pub fn new(config: ImapConfig) -> Self {
        Self { config }
    }

    /// Fetch every message matching the configured newsletter sources.
    ///
    /// Blocking. Callers on the async runtime should wrap this in
    /// `tokio::task::spawn_blocking`.
    pub fn fetch(
        &self,
        sources: &[NewsletterSource],
        newer_than: &str,
    ) -> Result<Vec<RawMessage>> {
        let mut queries = Vec::with_capacity(sources.len());
        for source in sources {
            let query = build_search_query(source, newer_than)?;
            info!(source = %source.email, query = %query, "Searching mailbox");
            queries.push(query);
        }

        let messages = fetch_messages(&self.config, &queries)?;
        info!(fetched = messages.len(), "Fetched newsletter messages");
        Ok(messages)
    }
}

// ── IMAP session ────────────────────────────────────────────────────

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// Run one IMAP session: search every query, fetch the matches, mark
/// them `\Seen` and log out.
fn fetch_messages(
    config: &ImapConfig,
    queries: &[String],
) -> std::result::Result<Vec<RawMessage>, MailboxError> {
    use std::sync::Arc;

    let tcp = TcpStream::connect((&*config.host, config.port)).map_err(|e| {
        MailboxError::ConnectFailed {
            host: config.host.clone(),
            reason: e.to_string(),
        }
    })?;
    tcp.set_read_timeout(Some(Duration::from_secs(30)))?;

    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    );
    let server_name: rustls::pki_types::ServerName<'_> =
        rustls::pki_types::ServerName::try_from(config.host.clone()).map_err(|e| {
            MailboxError::ConnectFailed {
                host: config.host.clone(),
                reason: format!("Invalid server name: {e}"),
            }
        })?;
    let conn = rustls::ClientConnection::new(tls_config, server_name).map_err(|e| {
        MailboxError::ConnectFailed {
            host: config.host.clone(),
            reason: e.to_string(),
        }
    })?;
    let mut tls = rustls::StreamOwned::new(conn, tcp);

    let read_line = |tls: &mut TlsStream| -> std::result::Result<String, MailboxError> {
        let mut buf = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            match std::io::Read::read(tls, &mut byte) {
                Ok(0) => {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "IMAP connection closed",
                    )
                    .into());
                }
                Ok(_) => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(String::from_utf8_lossy(&buf).to_string());
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    };

    let send_cmd = |tls: &mut TlsStream,
                    tag: &str,
                    cmd: &str|
     -> std::result::Result<Vec<String>, MailboxError> {
        let full = format!("{tag} {cmd}\r\n");
        IoWrite::write_all(tls, full.as_bytes())?;
        IoWrite::flush(tls)?;
        let mut lines = Vec::new();
        loop {
            let line = read_line(tls)?;
            let done = line.starts_with(tag);
            lines.push(line);
            if done {
                break;
            }
        }
        Ok(lines)
    };

    let _greeting = read_line(&mut tls)?;

    let login = send_cmd(
        &mut tls,
        "A1",
        &format!(
            "LOGIN \"{}\" \"{}\"",
            imap_quote(&config.username),
            imap_quote(config.password.expose_secret())
        ),
    )?;
    if !response_ok(&login) {
        return Err(MailboxError::AuthFailed {
            user: config.username.clone(),
            reason: last_line(&login),
        });
    }

    let select = send_cmd(&mut tls, "A2", "SELECT \"INBOX\"")?;
    if !response_ok(&select) {
        return Err(MailboxError::UnexpectedResponse {
            command: "SELECT".to_string(),
            response: last_line(&select),
        });
    }

    let mut tag_counter = 3_u32;
    let mut uids: Vec<u32> = Vec::new();
    let mut seen_uids: HashSet<u32> = HashSet::new();

    for query in queries {
        let tag = format!("A{tag_counter}");
        tag_counter += 1;
        let search = send_cmd(&mut tls, &tag, &format!("UID SEARCH {query}"))?;
        if !response_ok(&search) {
            return Err(MailboxError::UnexpectedResponse {
                command: format!("UID SEARCH {query}"),
                response: last_line(&search),
            });
        }
        for uid in parse_search_uids(&search)
            .into_iter()
            .take(MAX_MESSAGES_PER_SOURCE)
        {
            // A message can match several sources; fetch it once.
            if seen_uids.insert(uid) {
                uids.push(uid);
            }
        }
    }

    debug!(matched = uids.len(), "Mailbox search complete");

    let mut results = Vec::new();
    for uid in uids {
        let fetch_tag = format!("A{tag_counter}");
        tag_counter += 1;
        let fetch_resp = send_cmd(&mut tls, &fetch_tag, &format!("UID FETCH {uid} (RFC822)"))?;

        let mut raw_lines: Vec<String> = fetch_resp
            .iter()
            .skip(1)
            .take(fetch_resp.len().saturating_sub(2))
            .cloned()
            .collect();
        if raw_lines.last().is_some_and(|line| line.trim() == ")") {
            raw_lines.pop();
        }
        let raw = raw_lines.concat();

        match parse_raw_message(uid, &raw) {
            Some(message) => results.push(message),
            None => warn!(uid, "Skipping unparseable message"),
        }

        let store_tag = format!("A{tag_counter}");
        tag_counter += 1;
        let _ = send_cmd(&mut tls, &store_tag, &format!("UID STORE {uid} +FLAGS (\\Seen)"));
    }

    let logout_tag = format!("A{tag_counter}");
    let _ = send_cmd(&mut tls, &logout_tag, "LOGOUT");

    Ok(results)
}

// ── Response parsing ────────────────────────────────────────────────

/// A tagged IMAP response ends in `<tag> OK ...` on success.
fn response_ok(lines: &[String]) -> bool {
    lines
        .last()
        .is_some_and(|line| line.split_whitespace().nth(1) == Some("OK"))
}

fn last_line(lines: &[String]) -> String {
    lines.last().map(|line| line.trim().to_string()).unwrap_or_default()
}

/// Collect UIDs from `* SEARCH ...` lines.
fn parse_search_uids(lines: &[String]) -> Vec<u32> {
    let mut uids = Vec::new();
    for line in lines {
        if let Some(rest) = line.strip_prefix("* SEARCH") {
            uids.extend(rest.split_whitespace().filter_map(|t| t.parse::<u32>().ok()));
        }
    }
    uids
}

/// Parse a raw RFC822 message into a `RawMessage`.
fn parse_raw_message(uid: u32, raw: &str) -> Option<RawMessage> {
    let parsed = MessageParser::default().parse(raw.as_bytes())?;
    let sender = extract_sender(&parsed);
    let subject = parsed.subject().unwrap_or("(no subject)").to_string();
    // body_html synthesizes HTML from plain text parts; only accept real ones.
    let html = if parsed.html_body.is_empty() {
        None
    } else {
        parsed.body_html(0).map(|body| body.to_string())
    };
    Some(RawMessage {
        uid,
        sender,
        subject,
        html,
    })
}

/// Extract the sender address from a parsed email.
fn extract_sender(parsed: &mail_parser::Message) -> String {
    parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".into())
}

// ── Tests ───────────────────────────────────────────────────────────

// Stowage - Azure Blob storage access
// Copyright (C) 2025 Stowage Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published
// by the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.

//! Object locators
//!
//! A stored object is addressed by its public URL:
//!
//! ```text
//! https://{account}.blob.core.windows.net/{container}/{blob}
//! ```
//!
//! [`encode`] builds that URL and [`decode`] takes it apart again. The blob
//! name may contain `/`; each of its segments is percent-encoded on the way
//! out and decoded on the way in, so `decode(encode(a, c, b))` yields
//! `(a, c, b)`.

use crate::error::{Error, Result};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use std::fmt;
use std::sync::Arc;
use stowage_config::{ConfigError, ConfigResult};
use url::Url;

/// Host suffix of the public blob endpoint
pub const HOST_SUFFIX: &str = "blob.core.windows.net";

/// Characters escaped inside a single path segment
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Builds the service URL for an account
///
/// Arguments are the account name, the SAS token without its leading `?`,
/// and the container name when one is configured.
pub type ServiceUrlProvider = Arc<dyn Fn(&str, Option<&str>, Option<&str>) -> String + Send + Sync>;

/// The three parts of an object URL
///
/// Two locators are equal when they name the same object, whatever URL
/// they were decoded from.
#[derive(Debug, Clone)]
pub struct ObjectLocator {
    /// Storage account
    pub account_name: String,
    /// Container holding the object
    pub container_name: String,
    /// Object name, possibly containing `/`
    pub blob_name: String,
    /// The URL as given to [`decode`], or the encoded URL for [`ObjectLocator::new`]
    pub raw_url: String,
}

impl ObjectLocator {
    /// Create a locator from its parts
    pub fn new(
        account_name: impl Into<String>,
        container_name: impl Into<String>,
        blob_name: impl Into<String>,
    ) -> Self {
        let account_name = account_name.into().to_ascii_lowercase();
        let container_name = container_name.into();
        let blob_name = blob_name.into();
        let raw_url = encode(&account_name, &container_name, &blob_name);
        ObjectLocator {
            account_name,
            container_name,
            blob_name,
            raw_url,
        }
    }

    /// The public URL of this object
    pub fn to_url(&self) -> String {
        encode(&self.account_name, &self.container_name, &self.blob_name)
    }
}

impl PartialEq for ObjectLocator {
    fn eq(&self, other: &Self) -> bool {
        self.account_name == other.account_name
            && self.container_name == other.container_name
            && self.blob_name == other.blob_name
    }
}

impl Eq for ObjectLocator {}

impl fmt::Display for ObjectLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_url())
    }
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Build the public URL of an object
///
/// Account names are case-insensitive host labels and are written in lower
/// case, the form [`decode`] returns them in.
///
/// ```
/// use stowage_storage::locator::encode;
///
/// assert_eq!(
///     encode("acct", "c1", "photos/cat 1.png"),
///     "https://acct.blob.core.windows.net/c1/photos/cat%201.png"
/// );
/// ```
pub fn encode(account_name: &str, container_name: &str, blob_name: &str) -> String {
    format!(
        "https://{}.{}/{}/{}",
        account_name.to_ascii_lowercase(),
        HOST_SUFFIX,
        utf8_percent_encode(container_name, SEGMENT),
        encode_path(blob_name)
    )
}

/// Take an object URL apart
///
/// The URL must parse, use `http` or `https`, and name a host of the form
/// `{account}.blob.core.windows.net`. The first path segment is the
/// container and the remainder the blob name; both must be non-empty.
/// Query string and fragment are ignored. Dot segments are kept as written.
pub fn decode(url: &str) -> Result<ObjectLocator> {
    let raw = url.trim();
    let parsed = Url::parse(raw).map_err(|e| Error::malformed_locator(url, e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(Error::malformed_locator(
                url,
                format!("unsupported scheme \"{}\"", other),
            ))
        }
    }

    if !parsed.username().is_empty() || parsed.password().is_some() {
        return Err(Error::malformed_locator(url, "credentials in URL are not allowed"));
    }
    if parsed.port().is_some() {
        return Err(Error::malformed_locator(url, "explicit port is not allowed"));
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| Error::malformed_locator(url, "missing host"))?;
    let account_name = host
        .strip_suffix(HOST_SUFFIX)
        .and_then(|prefix| prefix.strip_suffix('.'))
        .filter(|account| !account.is_empty() && !account.contains('.'))
        .ok_or_else(|| {
            Error::malformed_locator(url, format!("host is not {{account}}.{}", HOST_SUFFIX))
        })?;

    // The parsed path has dot segments resolved; read the raw one instead.
    let path = raw_path(raw);
    let path = path.strip_prefix('/').unwrap_or(path);
    let (container, blob) = path
        .split_once('/')
        .ok_or_else(|| Error::malformed_locator(url, "missing blob name"))?;

    if container.is_empty() {
        return Err(Error::malformed_locator(url, "missing container name"));
    }
    if blob.is_empty() {
        return Err(Error::malformed_locator(url, "missing blob name"));
    }

    Ok(ObjectLocator {
        account_name: account_name.to_string(),
        container_name: percent_decode(url, container)?,
        blob_name: percent_decode(url, blob)?,
        raw_url: raw.to_string(),
    })
}

/// Path of `url` exactly as written, without query or fragment
fn raw_path(url: &str) -> &str {
    let after_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let after_authority = after_scheme
        .find(['/', '?', '#'])
        .map_or("", |idx| &after_scheme[idx..]);
    let end = after_authority.find(['?', '#']).unwrap_or(after_authority.len());
    &after_authority[..end]
}

fn percent_decode(url: &str, part: &str) -> Result<String> {
    percent_decode_str(part)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|e| Error::malformed_locator(url, format!("invalid percent-encoding: {}", e)))
}

/// Strip one leading `?` from a SAS token
pub fn normalize_sas(sas: &str) -> &str {
    sas.strip_prefix('?').unwrap_or(sas)
}

/// Build the blob service URL of an account, with the SAS appended if given
///
/// ```
/// use stowage_storage::locator::build_service_url;
///
/// assert_eq!(
///     build_service_url("acct", Some("?sv=abc")),
///     "https://acct.blob.core.windows.net/?sv=abc"
/// );
/// assert_eq!(build_service_url("acct", None), "https://acct.blob.core.windows.net/");
/// ```
pub fn build_service_url(account_name: &str, sas: Option<&str>) -> String {
    let base = format!("https://{}.{}/", account_name, HOST_SUFFIX);
    match sas.map(normalize_sas).filter(|s| !s.is_empty()) {
        Some(token) => format!("{}?{}", base, token),
        None => base,
    }
}

/// Service URL from the custom provider when given, otherwise the default one
///
/// Provider output must parse as a URL.
pub fn resolve_service_url(
    account_name: &str,
    sas: Option<&str>,
    container_name: Option<&str>,
    provider: Option<&ServiceUrlProvider>,
) -> ConfigResult<String> {
    let Some(provider) = provider else {
        return Ok(build_service_url(account_name, sas));
    };

    let sas = sas.map(normalize_sas).filter(|s| !s.is_empty());
    let url = provider(account_name, sas, container_name);
    Url::parse(&url).map_err(|e| {
        ConfigError::invalid_value("service_url_provider", url.clone(), e.to_string())
    })?;
    Ok(url)
}

use crate::picture::Picture;
use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

pub const DEFAULT_ENDPOINT: &str = "https://api.nasa.gov/planetary/apod";
pub const DEMO_KEY: &str = "DEMO_KEY";

/// Shown when the response carries no copyright (public domain pictures).
pub const FALLBACK_COPYRIGHT: &str = "NASA";

/// File extensions the viewer will try to display.
pub const SUPPORTED_FORMATS: &[&str] = &["jpg", "jpeg", "png", "gif", "tif", "bmp", "ico", "svg"];

/// APOD pictures regularly run past ureq's default 10 MB body limit.
const MAX_PICTURE_BYTES: u64 = 128 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub endpoint: Url,
    pub api_key: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            endpoint: Url::parse(DEFAULT_ENDPOINT).expect("default endpoint is a valid URL"),
            api_key: DEMO_KEY.to_string(),
        }
    }
}

impl FetchConfig {
    /// `{endpoint}?date=YYYY-MM-DD&api_key={key}`
    pub fn request_url(&self, date: NaiveDate) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("date", &date.format("%Y-%m-%d").to_string())
            .append_pair("api_key", &self.api_key);
        url
    }
}

/// The subset of the APOD JSON payload the viewer uses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApodResponse {
    pub url: String,
    #[serde(default)]
    pub copyright: Option<String>,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub hdurl: Option<String>,
}

/// A finished HTTP exchange, whatever its status. The body read can still
/// fail after the status line arrived, e.g. when the peer hangs up early.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub reason: String,
    pub body: Result<Vec<u8>, String>,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// `"404 Not Found"`, or just `"599"` when the status has no reason phrase.
fn status_line(code: &u16, reason: &str) -> String {
    format!("{code} {reason}").trim_end().to_string()
}

#[derive(Debug, Error)]
pub enum RetrieveError {
    #[error(
        "We were unable to retrieve the NASA picture for that day: {}",
        status_line(code, reason)
    )]
    Status { code: u16, reason: String },

    #[error("We were unable to retrieve the NASA picture for that day: {0}")]
    Transport(String),

    #[error("Image data is not supported. {0}")]
    Parse(String),

    #[error("Image data is not supported. {0}")]
    Picture(String),
}

/// Blocking HTTP GET. Implementations must return non-2xx replies as
/// `Ok`, reserving `Err` for exchanges that produced no status at all.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str, accept: &str) -> Result<HttpReply, RetrieveError>;
}

pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

impl Transport for UreqTransport {
    fn get(&self, url: &str, accept: &str) -> Result<HttpReply, RetrieveError> {
        let mut response = self
            .agent
            .get(url)
            .header("Accept", accept)
            .call()
            .map_err(|e| RetrieveError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .body_mut()
            .with_config()
            .limit(MAX_PICTURE_BYTES)
            .read_to_vec()
            .map_err(|e| e.to_string());
        Ok(HttpReply {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            body,
        })
    }
}

/// What the display should show after one fetch.
pub enum ImageUpdate {
    /// Leave whatever picture is on screen.
    Unchanged,
    /// Downloaded and decoded.
    Decoded { url: String, picture: Picture },
    /// Unsupported format: only the address is kept, shown as a link.
    Link { url: String },
}

pub struct Retrieval {
    pub date: NaiveDate,
    pub title: Option<String>,
    /// Publication date as reported by the API
    pub apod_date: Option<String>,
    pub media_type: Option<String>,
    pub hd_url: Option<String>,
    pub copyright: String,
    pub description: String,
    pub image: ImageUpdate,
    /// The API answered with a success status, so this counts as a download.
    pub counted: bool,
}

impl Retrieval {
    fn new(date: NaiveDate) -> Self {
        Self {
            date,
            title: None,
            apod_date: None,
            media_type: None,
            hd_url: None,
            copyright: FALLBACK_COPYRIGHT.to_string(),
            description: String::new(),
            image: ImageUpdate::Unchanged,
            counted: false,
        }
    }

    /// Outcome for a fetch that died before producing a result.
    pub fn failed(date: NaiveDate, message: &str) -> Self {
        let mut out = Self::new(date);
        out.description = RetrieveError::Picture(message.to_string()).to_string();
        out
    }
}

/// Lower-cased extension of the last path segment, if it has one.
pub fn url_extension(url: &Url) -> Option<String> {
    let last = url.path_segments()?.next_back()?;
    let (_, ext) = last.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}

pub fn is_supported_format(ext: &str) -> bool {
    SUPPORTED_FORMATS.iter().any(|f| f.eq_ignore_ascii_case(ext))
}

/// Fetch the picture of the day for `date`. Never fails: every problem ends
/// up in the description text.
pub fn retrieve(transport: &dyn Transport, config: &FetchConfig, date: NaiveDate) -> Retrieval {
    let mut out = Retrieval::new(date);
    let request = config.request_url(date);
    info!("fetching APOD for {date}");

    let reply = match transport.get(request.as_str(), "application/json") {
        Ok(reply) => reply,
        Err(e) => {
            warn!("APOD request for {date} failed: {e}");
            out.description = e.to_string();
            return out;
        }
    };
    debug!("APOD for {date}: HTTP {} {}", reply.status, reply.reason);

    if !reply.is_success() {
        let e = RetrieveError::Status {
            code: reply.status,
            reason: reply.reason,
        };
        warn!("APOD request for {date} rejected: {e}");
        out.description = e.to_string();
        return out;
    }

    out.counted = true;
    let payload = reply.body.map_err(RetrieveError::Parse);
    if let Err(e) = payload.and_then(|body| apply_payload(&mut out, transport, &body)) {
        warn!("APOD payload for {date} unusable: {e}");
        out.description = e.to_string();
    }
    out
}

fn apply_payload(
    out: &mut Retrieval,
    transport: &dyn Transport,
    body: &[u8],
) -> Result<(), RetrieveError> {
    let apod: ApodResponse =
        serde_json::from_slice(body).map_err(|e| RetrieveError::Parse(e.to_string()))?;
    let url = Url::parse(&apod.url)
        .map_err(|e| RetrieveError::Parse(format!("{e}: {}", apod.url)))?;
    out.title = apod.title.clone();
    out.apod_date = apod.date.clone();
    out.media_type = apod.media_type.clone();
    out.hd_url = apod.hdurl.clone();

    let ext = url_extension(&url);
    let Some(ext) = ext.filter(|e| is_supported_format(e)) else {
        debug!("unsupported media ({:?}) at {}", apod.media_type, apod.url);
        out.description = format!("Image type is not supported. URL is {}", apod.url);
        out.image = ImageUpdate::Link { url: apod.url };
        return Ok(());
    };

    let picture = download_picture(transport, &url, &ext)?;
    out.image = ImageUpdate::Decoded {
        url: apod.url,
        picture,
    };
    if let Some(c) = apod.copyright.filter(|c| !c.trim().is_empty()) {
        out.copyright = c;
    }
    out.description = apod.explanation;
    Ok(())
}

fn download_picture(
    transport: &dyn Transport,
    url: &Url,
    ext: &str,
) -> Result<Picture, RetrieveError> {
    let reply = transport.get(url.as_str(), "image/*").map_err(|e| match e {
        RetrieveError::Transport(msg) => RetrieveError::Picture(msg),
        other => other,
    })?;
    if !reply.is_success() {
        return Err(RetrieveError::Picture(format!(
            "HTTP {} fetching {url}",
            status_line(&reply.status, &reply.reason)
        )));
    }
    let body = reply.body.map_err(RetrieveError::Picture)?;
    Picture::decode(&body, ext).map_err(|e| RetrieveError::Picture(format!("{e:#}")))
}

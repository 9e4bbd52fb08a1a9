use crate::apod::{ImageUpdate, RetrieveError, Retrieval, FALLBACK_COPYRIGHT};
use chrono::NaiveDate;
use log::debug;

/// Everything the window shows about the current picture, plus the session
/// download counter.
///
/// Fetch results are only applied when they belong to the most recently
/// started request, so a slow reply for an earlier date can never overwrite
/// a newer one.
pub struct ViewState {
    pub title: Option<String>,
    pub apod_date: Option<String>,
    pub media_type: Option<String>,
    pub hd_url: Option<String>,
    pub copyright: String,
    pub description: String,
    /// Last picture (or link) successfully produced; survives failed fetches.
    pub image: ImageUpdate,
    /// Date of the request in flight, if any
    pub loading: Option<NaiveDate>,
    downloads: u64,
    latest_request: u64,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            title: None,
            apod_date: None,
            media_type: None,
            hd_url: None,
            copyright: FALLBACK_COPYRIGHT.to_string(),
            description: String::new(),
            image: ImageUpdate::Unchanged,
            loading: None,
            downloads: 0,
            latest_request: 0,
        }
    }
}

impl ViewState {
    pub fn downloads(&self) -> u64 {
        self.downloads
    }

    /// Reset the text fields for a new fetch and return its request id.
    /// Any request started earlier is superseded from here on.
    pub fn begin(&mut self, date: NaiveDate) -> u64 {
        self.latest_request += 1;
        self.title = None;
        self.apod_date = None;
        self.media_type = None;
        self.hd_url = None;
        self.copyright = FALLBACK_COPYRIGHT.to_string();
        self.description.clear();
        self.loading = Some(date);
        self.latest_request
    }

    /// Apply a finished fetch. Returns `true` when the image changed and the
    /// texture needs rebuilding; results of superseded requests are dropped.
    pub fn apply(&mut self, request: u64, retrieval: Retrieval) -> bool {
        if request != self.latest_request {
            debug!(
                "discarding superseded result #{request} for {} (latest is #{})",
                retrieval.date, self.latest_request
            );
            return false;
        }
        self.loading = None;
        self.title = retrieval.title;
        self.apod_date = retrieval.apod_date;
        self.media_type = retrieval.media_type;
        self.hd_url = retrieval.hd_url;
        self.copyright = retrieval.copyright;
        self.description = retrieval.description;
        if retrieval.counted {
            self.downloads += 1;
        }
        match retrieval.image {
            ImageUpdate::Unchanged => false,
            update => {
                self.image = update;
                true
            }
        }
    }

    /// The fetch in flight vanished without reporting back.
    pub fn interrupted(&mut self, reason: &str) {
        if let Some(date) = self.loading.take() {
            debug!("fetch for {date} ended without a result");
            self.description = RetrieveError::Picture(reason.to_string()).to_string();
        }
    }

    pub fn image_url(&self) -> Option<&str> {
        match &self.image {
            ImageUpdate::Unchanged => None,
            ImageUpdate::Decoded { url, .. } | ImageUpdate::Link { url } => Some(url.as_str()),
        }
    }
}

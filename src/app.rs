use crate::apod::{self, FetchConfig, ImageUpdate, Retrieval, Transport};
use crate::dates::{DateSelector, LAUNCH_DATE};
use crate::view::ViewState;
use chrono::NaiveDate;
use egui::TextureHandle;
use egui_extras::DatePickerButton;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;

struct LoadResult {
    request: u64,
    retrieval: Retrieval,
}

/// How the window starts up; filled from the command line.
pub struct StartOptions {
    pub config: FetchConfig,
    pub today: NaiveDate,
    pub date: Option<NaiveDate>,
    pub limit_range: bool,
}

pub struct ApodApp {
    /// egui context, stored so background threads can call request_repaint()
    ctx: egui::Context,

    transport: Arc<dyn Transport>,
    config: FetchConfig,

    dates: DateSelector,
    view: ViewState,

    /// Cached egui texture for the current picture
    texture: Option<TextureHandle>,

    /// Receiver for the in-flight fetch; None when idle
    load_rx: Option<mpsc::Receiver<LoadResult>>,

    /// Zoom: None = autofit, Some(s) = explicit scale factor
    zoom: Option<f32>,

    /// Whether the keyboard shortcuts help popup is open
    show_help: bool,
}

impl ApodApp {
    pub fn new(cc: &eframe::CreationContext<'_>, start: StartOptions) -> Self {
        Self::with_transport(cc.egui_ctx.clone(), Arc::new(apod::UreqTransport::new()), start)
    }

    fn with_transport(
        ctx: egui::Context,
        transport: Arc<dyn Transport>,
        start: StartOptions,
    ) -> Self {
        let mut dates = DateSelector::new(start.today);
        dates.set_limit_range(start.limit_range);
        if let Some(date) = start.date {
            dates.select(date);
        }

        let mut app = Self {
            ctx,
            transport,
            config: start.config,
            dates,
            view: ViewState::default(),
            texture: None,
            load_rx: None,
            zoom: None,
            show_help: false,
        };
        app.fetch_selected();
        app
    }

    /// Start fetching the picture for the selected date on a worker thread.
    /// Any fetch still in flight is abandoned.
    fn fetch_selected(&mut self) {
        let date = self.dates.selected();
        let request = self.view.begin(date);
        let (tx, rx) = mpsc::channel();
        self.load_rx = Some(rx); // drops any in-flight fetch

        let ctx = self.ctx.clone();
        let transport = Arc::clone(&self.transport);
        let config = self.config.clone();
        std::thread::spawn(move || {
            // decoders run on untrusted bytes; a panic still has to reach the UI as text
            let retrieval = panic::catch_unwind(AssertUnwindSafe(|| {
                apod::retrieve(transport.as_ref(), &config, date)
            }))
            .unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                log::error!("fetch for {date} panicked: {message}");
                Retrieval::failed(date, &message)
            });
            let _ = tx.send(LoadResult { request, retrieval });
            ctx.request_repaint();
        });
    }

    /// Run `change` against the date selector and refetch if the selection moved.
    fn change_date(&mut self, change: impl FnOnce(&mut DateSelector) -> bool) {
        if change(&mut self.dates) {
            self.fetch_selected();
        }
    }

    fn poll_fetch(&mut self) {
        let Some(rx) = &self.load_rx else { return };
        let result = match rx.try_recv() {
            Ok(result) => result,
            Err(mpsc::TryRecvError::Empty) => return,
            Err(mpsc::TryRecvError::Disconnected) => {
                self.load_rx = None;
                self.view.interrupted("the download stopped without a result");
                return;
            }
        };
        self.load_rx = None;
        if self.view.apply(result.request, result.retrieval) {
            self.texture = None;
            self.zoom = None;
        }
    }

    /// Rebuild the egui texture from the current picture.
    fn rebuild_texture(&mut self, ctx: &egui::Context) {
        let ImageUpdate::Decoded { picture, .. } = &self.view.image else { return };
        self.texture = Some(ctx.load_texture(
            "apod_picture",
            picture.to_color_image(),
            egui::TextureOptions::LINEAR,
        ));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "the download crashed".to_string())
}

impl eframe::App for ApodApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_fetch();

        let (go_prev, go_next, go_launch, go_today, toggle_limit) = ctx.input(|i| {
            use egui::Key;
            (
                i.key_pressed(Key::ArrowLeft),
                i.key_pressed(Key::ArrowRight),
                i.key_pressed(Key::Home),
                i.key_pressed(Key::End),
                i.key_pressed(Key::L),
            )
        });
        let zoom_in = ctx.input(|i| {
            i.key_pressed(egui::Key::Plus) || i.key_pressed(egui::Key::Equals)
        });
        let zoom_out = ctx.input(|i| i.key_pressed(egui::Key::Minus));
        let zoom_reset = ctx.input(|i| i.key_pressed(egui::Key::Num0));
        let zoom_fit = ctx.input(|i| i.key_pressed(egui::Key::F));
        let toggle_help = ctx.input(|i| i.key_pressed(egui::Key::Questionmark));
        let close_popup = ctx.input(|i| i.key_pressed(egui::Key::Escape));

        if go_prev { self.change_date(|d| d.step_days(-1)); }
        if go_next { self.change_date(|d| d.step_days(1)); }
        if go_launch { self.change_date(DateSelector::jump_to_launch); }
        if go_today { self.change_date(DateSelector::jump_to_today); }
        if toggle_limit {
            let checked = !self.dates.limit_range();
            self.change_date(|d| d.set_limit_range(checked));
        }
        if zoom_in {
            let s = self.zoom.unwrap_or(1.0);
            self.zoom = Some((s * 1.25).min(32.0));
        }
        if zoom_out {
            let s = self.zoom.unwrap_or(1.0);
            self.zoom = Some((s / 1.25).max(0.05));
        }
        if zoom_reset {
            self.zoom = Some(1.0);
        }
        if zoom_fit {
            self.zoom = None;
        }
        if toggle_help {
            self.show_help = !self.show_help;
        }
        if close_popup {
            self.show_help = false;
        }

        // Help popup
        if self.show_help {
            egui::Window::new("Keyboard shortcuts")
                .collapsible(false)
                .resizable(false)
                .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
                .show(ctx, |ui| {
                    egui::Grid::new("help_grid").striped(true).show(ui, |ui| {
                        let rows: &[(&str, &str)] = &[
                            ("← / →",  "Previous / next day"),
                            ("Home",   "Jump to the APOD launch date"),
                            ("End",    "Jump to today"),
                            ("L",      "Limit / unlimit range to this year"),
                            ("+  /  -", "Zoom in / out"),
                            ("0",      "Zoom to 1:1 (100 %)"),
                            ("F",      "Zoom to fit"),
                            ("?",      "Show / hide this help"),
                        ];
                        for (key, desc) in rows {
                            ui.label(egui::RichText::new(*key).monospace().strong());
                            ui.label(*desc);
                            ui.end_row();
                        }
                    });
                    ui.separator();
                    if ui.button("Close  [?]").clicked() {
                        self.show_help = false;
                    }
                });
        }

        // Ensure texture is built
        if matches!(self.view.image, ImageUpdate::Decoded { .. }) && self.texture.is_none() {
            self.rebuild_texture(ctx);
        }

        // Top bar: date selection
        let mut picked = self.dates.selected();
        let mut limit_range = self.dates.limit_range();
        let mut prev_btn = false;
        let mut next_btn = false;
        let mut launch_btn = false;
        let mut today_btn = false;
        let btn_size = egui::vec2(32.0, 24.0);
        egui::TopBottomPanel::top("date_bar").show(ctx, |ui| {
            ui.add_space(4.0);
            ui.horizontal(|ui| {
                ui.label(egui::RichText::new("APOD").strong());
                ui.separator();

                prev_btn = ui.add_enabled(
                    self.dates.selected() > self.dates.min(),
                    egui::Button::new("<").min_size(btn_size),
                ).on_hover_text("Previous day  [Left]").clicked();

                ui.add(DatePickerButton::new(&mut picked).id_source("apod_date"));

                next_btn = ui.add_enabled(
                    self.dates.selected() < self.dates.max(),
                    egui::Button::new(">").min_size(btn_size),
                ).on_hover_text("Next day  [Right]").clicked();

                ui.separator();
                today_btn = ui.button("Today").on_hover_text("Jump to today  [End]").clicked();
                launch_btn = ui.button("Launch")
                    .on_hover_text(format!("Jump to the first APOD, {LAUNCH_DATE}  [Home]"))
                    .clicked();
                ui.separator();
                ui.checkbox(&mut limit_range, "Limit to this year")
                    .on_hover_text("Only allow dates since January 1  [L]");

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button("?").on_hover_text("Show keyboard shortcuts  [?]").clicked() {
                        self.show_help = !self.show_help;
                    }
                    ui.small(format!("{} … {}", self.dates.min(), self.dates.max()));
                });
            });
            ui.add_space(4.0);
        });

        if prev_btn { self.change_date(|d| d.step_days(-1)); }
        if next_btn { self.change_date(|d| d.step_days(1)); }
        if picked != self.dates.selected() {
            if !self.dates.contains(picked) {
                let (min, max) = (self.dates.min(), self.dates.max());
                log::debug!("{picked} outside {min}..={max}, clamping");
            }
            self.change_date(|d| d.select(picked));
        }
        if limit_range != self.dates.limit_range() {
            self.change_date(|d| d.set_limit_range(limit_range));
        }
        if today_btn { self.change_date(DateSelector::jump_to_today); }
        if launch_btn { self.change_date(DateSelector::jump_to_launch); }

        // Bottom status bar: download counter + zoom
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(format!("Pictures downloaded this session: {}", self.view.downloads()));
                if let Some(date) = self.view.loading {
                    ui.separator();
                    ui.spinner();
                    ui.label(format!("Fetching {date}…"));
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    let zoom_str = match self.zoom {
                        None => "Fit".to_string(),
                        Some(s) => format!("{:.0}%", s * 100.0),
                    };
                    ui.label(zoom_str).on_hover_text("Zoom  [+] [-] [0=1:1] [F=fit]");
                    ui.label("Zoom:").on_hover_text("Zoom  [+] [-] [0=1:1] [F=fit]");
                });
            });
        });

        // Right panel: title, copyright, explanation
        egui::SidePanel::right("details_panel")
            .resizable(true)
            .default_width(320.0)
            .show(ctx, |ui| {
                let heading = self
                    .view
                    .title
                    .clone()
                    .unwrap_or_else(|| self.dates.selected().to_string());
                ui.heading(heading);
                if let Some(date) = &self.view.apod_date {
                    ui.small(date.as_str());
                }
                ui.label(
                    egui::RichText::new(format!("© {}", self.view.copyright.trim()))
                        .italics(),
                );
                ui.horizontal(|ui| {
                    if let Some(media) = &self.view.media_type {
                        ui.label(egui::RichText::new(media.as_str()).monospace());
                    }
                    if let Some(url) = self.view.image_url() {
                        ui.hyperlink_to("Source", url);
                    }
                    if let Some(hd) = &self.view.hd_url {
                        ui.hyperlink_to("HD", hd).on_hover_text("Full resolution picture");
                    }
                });
                ui.separator();
                egui::ScrollArea::vertical().show(ui, |ui| {
                    ui.label(self.view.description.as_str());
                });
            });

        // Center panel: picture viewport
        egui::CentralPanel::default().show(ctx, |ui| {
            if let ImageUpdate::Link { url } = &self.view.image {
                ui.centered_and_justified(|ui| {
                    ui.hyperlink_to(format!("Open {url}"), url);
                });
                return;
            }

            let Some(texture) = &self.texture else {
                ui.centered_and_justified(|ui| {
                    if let Some(date) = self.view.loading {
                        ui.label(format!("Loading the picture for {date}…"));
                    } else {
                        ui.label("No picture");
                    }
                });
                return;
            };

            let img_size = texture.size_vec2();
            let available = ui.available_size();

            let display_size = match self.zoom {
                None => {
                    // Autofit: scale to fill available area while preserving aspect ratio
                    let scale = (available.x / img_size.x).min(available.y / img_size.y);
                    img_size * scale
                }
                Some(s) => img_size * s,
            };

            egui::ScrollArea::both().show(ui, |ui| {
                ui.image((texture.id(), display_size));
            });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apod::{HttpReply, RetrieveError};
    use std::time::{Duration, Instant};

    /// Answers every request with 503 so no test touches the network.
    struct Unavailable;

    impl Transport for Unavailable {
        fn get(&self, _url: &str, _accept: &str) -> Result<HttpReply, RetrieveError> {
            Ok(HttpReply {
                status: 503,
                reason: "Service Unavailable".to_string(),
                body: Ok(Vec::new()),
            })
        }
    }

    struct Crashing;

    impl Transport for Crashing {
        fn get(&self, _url: &str, _accept: &str) -> Result<HttpReply, RetrieveError> {
            panic!("decoder blew up");
        }
    }

    fn app(date: Option<NaiveDate>, limit_range: bool) -> ApodApp {
        app_with(Arc::new(Unavailable), date, limit_range)
    }

    fn app_with(
        transport: Arc<dyn Transport>,
        date: Option<NaiveDate>,
        limit_range: bool,
    ) -> ApodApp {
        ApodApp::with_transport(
            egui::Context::default(),
            transport,
            StartOptions {
                config: FetchConfig::default(),
                today: NaiveDate::from_ymd_opt(2024, 8, 20).unwrap(),
                date,
                limit_range,
            },
        )
    }

    fn wait_for_fetch(app: &mut ApodApp) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while app.load_rx.is_some() && Instant::now() < deadline {
            app.poll_fetch();
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn startup_fetches_requested_date_within_range() {
        let mut app = app(NaiveDate::from_ymd_opt(2001, 1, 1), true);
        assert_eq!(app.dates.selected(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(app.view.loading, Some(app.dates.selected()));
        wait_for_fetch(&mut app);
        assert_eq!(
            app.view.description,
            "We were unable to retrieve the NASA picture for that day: 503 Service Unavailable"
        );
        assert_eq!(app.view.downloads(), 0);
        assert_eq!(app.view.loading, None);
    }

    #[test]
    fn unchanged_selection_does_not_refetch() {
        let mut app = app(None, false);
        wait_for_fetch(&mut app);
        app.change_date(DateSelector::jump_to_today);
        assert!(app.load_rx.is_none());
        app.change_date(DateSelector::jump_to_launch);
        assert!(app.load_rx.is_some());
        assert_eq!(app.view.loading, Some(LAUNCH_DATE));
    }

    #[test]
    fn crashed_fetch_ends_loading_with_message() {
        let mut app = app_with(Arc::new(Crashing), None, false);
        wait_for_fetch(&mut app);
        assert!(app.load_rx.is_none());
        assert_eq!(app.view.loading, None);
        assert_eq!(app.view.description, "Image data is not supported. decoder blew up");
        assert_eq!(app.view.downloads(), 0);
    }

    #[test]
    fn vanished_worker_ends_loading() {
        let mut app = app(None, false);
        wait_for_fetch(&mut app);
        app.view.begin(LAUNCH_DATE);
        let (tx, rx) = mpsc::channel::<LoadResult>();
        app.load_rx = Some(rx);
        drop(tx);
        app.poll_fetch();
        assert!(app.load_rx.is_none());
        assert_eq!(app.view.loading, None);
        assert!(app.view.description.starts_with("Image data is not supported. "));
    }
}

mod apod;
mod app;
mod dates;
mod picture;
mod view;

use chrono::NaiveDate;
use clap::Parser;
use url::Url;

#[derive(Parser)]
#[command(name = "apodview", about = "NASA Astronomy Picture of the Day viewer")]
struct Args {
    /// Date to show first, YYYY-MM-DD (defaults to today)
    #[arg(value_parser = dates::parse_date_arg)]
    date: Option<NaiveDate>,

    /// api.nasa.gov key
    #[arg(long, default_value = apod::DEMO_KEY)]
    api_key: String,

    /// APOD endpoint to query
    #[arg(long, default_value = apod::DEFAULT_ENDPOINT, value_parser = Url::parse)]
    endpoint: Url,

    /// Start with the date range limited to the current year
    #[arg(long)]
    limit_range: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let start = app::StartOptions {
        config: apod::FetchConfig {
            endpoint: args.endpoint,
            api_key: args.api_key,
        },
        today: chrono::Local::now().date_naive(),
        date: args.date,
        limit_range: args.limit_range,
    };
    log::info!("starting with endpoint {}", start.config.endpoint);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 800.0])
            .with_title("apodview"),
        ..Default::default()
    };

    eframe::run_native(
        "apodview",
        options,
        Box::new(|cc| Ok(Box::new(app::ApodApp::new(cc, start)))),
    )
    .map_err(|e| anyhow::anyhow!("eframe error: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_demo_key_and_nasa_endpoint() {
        let args = Args::try_parse_from(["apodview"]).unwrap();
        assert_eq!(args.api_key, "DEMO_KEY");
        assert_eq!(args.endpoint.as_str(), "https://api.nasa.gov/planetary/apod");
        assert_eq!(args.date, None);
        assert!(!args.limit_range);
    }

    #[test]
    fn parses_date_and_flags() {
        let args = Args::try_parse_from([
            "apodview",
            "2005-07-04",
            "--api-key",
            "k",
            "--limit-range",
        ])
        .unwrap();
        assert_eq!(args.date, NaiveDate::from_ymd_opt(2005, 7, 4));
        assert_eq!(args.api_key, "k");
        assert!(args.limit_range);
    }

    #[test]
    fn rejects_malformed_date() {
        assert!(Args::try_parse_from(["apodview", "07/04/2005"]).is_err());
        assert!(Args::try_parse_from(["apodview", "--endpoint", "not a url"]).is_err());
    }
}

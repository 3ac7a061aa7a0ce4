//! `webvakt doctor`: show the browser and engine settings a check would use.

use crate::cli::output::{self, OutputMode, Styled};
use anyhow::Result;
use webvakt::config::{find_chromium, webvakt_home};
use webvakt::{BrowserSettings, EngineConfig};

pub fn run(mode: OutputMode) -> Result<()> {
    let s = Styled::new();
    let mut problems = 0;

    eprintln!();
    output::print_section(&s, "Browser");
    match find_chromium() {
        Some(path) => {
            output::print_check(s.ok_sym(), "Chromium", &path.display().to_string());
        }
        None => {
            problems += 1;
            output::print_check(s.warn_sym(), "Chromium", &s.yellow("not found"));
            output::print_detail(&s.dim("Set WEBVAKT_CHROMIUM_PATH or install chromium"));
        }
    }
    let settings = BrowserSettings::from_env();
    output::print_check(
        s.ok_sym(),
        "Sandbox",
        if settings.no_sandbox { "disabled" } else { "enabled" },
    );
    if mode.verbose {
        output::print_check(s.ok_sym(), "Home", &webvakt_home().display().to_string());
    }

    eprintln!();
    output::print_section(&s, "Engine");
    match EngineConfig::from_env() {
        Ok(config) => {
            output::print_check(
                s.ok_sym(),
                "Wait until",
                &format!("{:?}", config.navigation.wait_until),
            );
            output::print_check(
                s.ok_sym(),
                "Navigation timeout",
                &format!("{} ms", config.navigation.timeout.as_millis()),
            );
            output::print_check(
                s.ok_sym(),
                "Extraction timeout",
                &format!("{} ms", config.extraction_timeout.as_millis()),
            );
            output::print_check(
                s.ok_sym(),
                "Concurrent extractions",
                &config.max_concurrent_extractions.to_string(),
            );
            output::print_check(
                s.ok_sym(),
                "Missing elements",
                &format!("{:?}", config.missing_element),
            );
        }
        Err(e) => {
            problems += 1;
            output::print_check(s.warn_sym(), "Configuration", &s.yellow("invalid"));
            output::print_detail(&s.dim(&e.to_string()));
        }
    }

    eprintln!();
    if problems == 0 {
        eprintln!("  {}", s.green("Ready to run checks."));
    } else {
        eprintln!("  {}", s.yellow(&format!("{problems} problem(s) found.")));
    }
    eprintln!();
    Ok(())
}

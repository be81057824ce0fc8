// Views for the Train Delay Viewer terminal client
use crate::tdv_api::{AuthNotice, NoticeKind};
use crate::tdv_map::MapRegion;
use crate::tdv_models::{EnrichedDelay, TDVModels};
use crate::tdv_pipeline::MessageLookup;
use std::io::{self, Write};
use std::path::Path;

pub struct TDVViews;

impl TDVViews {
    pub fn show_welcome() {
        println!("\n{}", "═".repeat(70));
        println!("  ╔═══════════════════════════════════════════════════════════╗");
        println!("  ║           🚆 TRAIN DELAY VIEWER - SWEDISH RAIL            ║");
        println!("  ║          Delays, traffic messages and favorites           ║");
        println!("  ╚═══════════════════════════════════════════════════════════╝");
        println!("{}", "═".repeat(70));
    }

    /// Main menu. `user` is the logged-in email, if any.
    pub fn show_menu(user: Option<&str>, delay_count: usize) {
        println!("\n{}", "═".repeat(60));
        match user {
            Some(email) => println!("  👤 Logged in as {}", email),
            None => println!("  👤 Not logged in"),
        }
        println!("  ⚠️  {} delayed stations", delay_count);
        println!("{}", "─".repeat(60));
        println!("  1️⃣  Show delayed stations");
        println!("  2️⃣  Show delay details");
        println!("  3️⃣  Show favorite stations");
        println!("  4️⃣  Add station to favorites");
        println!("  5️⃣  Remove station from favorites");
        println!("  6️⃣  Export delay map (GeoJSON)");
        println!("  7️⃣  Refresh delays 🔄");
        if user.is_some() {
            println!("  8️⃣  Logout");
        } else {
            println!("  8️⃣  Login");
            println!("  9️⃣  Register");
        }
        println!("  0️⃣  Quit");
        println!("\n{}", "─".repeat(60));
    }

    pub fn read_choice() -> String {
        Self::prompt("Your choice")
    }

    pub fn prompt(label: &str) -> String {
        print!("➜ {}: ", label);
        let _ = io::stdout().flush();
        let mut input = String::new();
        match io::stdin().read_line(&mut input) {
            Ok(_) => input.trim().to_string(),
            Err(e) => {
                eprintln!("⚠️  Error reading input: {}", e);
                String::new()
            }
        }
    }

    pub fn show_delays(title: &str, delays: &[EnrichedDelay]) {
        println!("\n{}", "═".repeat(70));
        println!("🚆 {} ({})", title, delays.len());
        println!("{}", "═".repeat(70));

        if delays.is_empty() {
            println!("\n  ✓ No delays to show");
            return;
        }

        println!("  {:<4}{:<8}{:<40}{}", "#", "Train", "Route", "Time");
        println!("{}", "─".repeat(70));

        for (i, delay) in delays.iter().enumerate() {
            let route = format!(
                "{} → {}",
                delay.from_station.advertised_name,
                delay.destination_name()
            );
            println!(
                "  {:<4}{:<8}{:<40}{}",
                i + 1,
                delay.event.advertised_train_ident,
                route,
                Self::time_summary(delay)
            );
        }
        println!("{}", "─".repeat(70));
    }

    fn time_summary(delay: &EnrichedDelay) -> String {
        let planned = TDVModels::format_clock(&delay.event.advertised_time_at_location);
        if delay.event.canceled {
            return format!("{} ❌ Cancelled", planned);
        }

        let estimated =
            TDVModels::format_clock_opt(delay.event.estimated_time_at_location.as_ref());
        match TDVModels::delay_minutes(&delay.event) {
            Some(minutes) => format!("{} → {} ({:+} min)", planned, estimated, minutes),
            None => format!("{} → {}", planned, estimated),
        }
    }

    pub fn show_delay_details(delay: &EnrichedDelay, lookup: &MessageLookup) {
        println!("\n{}", "═".repeat(70));
        println!(
            "🚆 {} {}",
            TDVModels::activity_label(&delay.event.activity_type),
            delay.event.advertised_train_ident
        );
        println!(
            "   {}  👉  {}",
            delay.from_station.advertised_name,
            delay.destination_name()
        );
        println!("{}", "═".repeat(70));

        if delay.event.canceled {
            println!("\n  🔴 NOTE: This train has been cancelled!");
        }
        println!(
            "\n  ⏰ Planned departure time: {}",
            TDVModels::format_clock(&delay.event.advertised_time_at_location)
        );
        if delay.event.canceled {
            println!("  ⏱️  New departure time: CANCELLED");
        } else {
            println!(
                "  ⏱️  New departure time: {}",
                TDVModels::format_clock_opt(delay.event.estimated_time_at_location.as_ref())
            );
        }

        match lookup {
            MessageLookup::Found(_) => {
                println!("\n  ⚠️  Faults affecting this station:");
                for message in lookup.messages() {
                    println!("{}", "  ┄".repeat(23));
                    println!("  📢 {}", message.header);
                    println!("     {}", message.external_description);
                }
            }
            MessageLookup::Empty => println!("\n  ✓ No traffic messages for this station"),
            MessageLookup::NotFetched => println!("\n  ℹ️  Traffic messages not loaded"),
        }
        println!("{}", "═".repeat(70));
    }

    pub fn show_notice(notice: &AuthNotice) {
        let icon = match notice.kind {
            NoticeKind::Success => "✓",
            NoticeKind::Danger => "✗",
        };
        if notice.message.is_empty() {
            println!("\n{} {}", icon, notice.title);
        } else {
            println!("\n{} {}: {}", icon, notice.title, notice.message);
        }
    }

    pub fn show_map_export(path: &Path, marker_count: usize, region: Option<MapRegion>) {
        println!("\n✓ Wrote {} station markers to {:?}", marker_count, path);
        if let Some(region) = region {
            println!(
                "  🗺️  Center ({:.4}, {:.4}), span {:.2}° × {:.2}°",
                region.latitude, region.longitude, region.latitude_delta, region.longitude_delta
            );
        }
    }

    pub fn show_loading(message: &str) {
        print!("\n⏳ {}...", message);
        let _ = io::stdout().flush();
    }

    pub fn clear_loading() {
        print!("\r{}\r", " ".repeat(70));
        let _ = io::stdout().flush();
    }

    pub fn network_error(error: &str) {
        eprintln!("\n⚠️  Could not load traffic data: {}", error);
        eprintln!("   Showing an empty list until the next refresh.");
    }

    pub fn login_required() {
        println!("\n🔒 Login to access favorites");
    }

    pub fn invalid_selection(input: &str) {
        println!("\n✗ '{}' does not match anything in the current list", input);
    }

    pub fn goodbye_message() {
        println!("\n👋 Trevlig resa!");
    }
}

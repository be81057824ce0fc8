mod tdv_api;
mod tdv_config;
mod tdv_controllers;
mod tdv_map;
mod tdv_models;
mod tdv_pipeline;
mod tdv_views;

use clap::Parser;
use tdv_config::Args;
use tdv_controllers::TDVControllers;

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Set up panic hook for better error messages
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("\n{}", "═".repeat(70));
        eprintln!("❌ APPLICATION PANIC");
        eprintln!("{}", "═".repeat(70));
        eprintln!("\n{}", panic_info);
        eprintln!("\n💡 Check your internet connection and restart the application.");
        eprintln!("{}", "═".repeat(70));
    }));

    let args = Args::parse();
    let mut controllers = TDVControllers::new(&args)?;

    match &args.geojson {
        Some(path) => controllers.export_once(path)?,
        None => controllers.run(),
    }

    Ok(())
}

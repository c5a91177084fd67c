use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use shiftpool::config::AppConfig;
use shiftpool::error::AppError;
use shiftpool::scheduling::geo::StaticTableProvider;
use shiftpool::scheduling::store::InMemoryBookingStore;
use shiftpool::scheduling::{
    CreateScheduleRequest, DateOutcome, DriverId, MultiDateReport, RouteCompatibilityChecker,
    SchedulingService, UserId,
};
use shiftpool::{server, telemetry};

#[derive(Parser, Debug)]
#[command(
    name = "shiftpool",
    about = "Book shared cab rides onto driver shift slots from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Run a canned assignment scenario against in-memory fixtures
    Demo,
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => run_server(args).await,
        Command::Demo => run_demo(),
    }
}

async fn run_server(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    server::run(config).await
}

fn run_demo() -> Result<(), AppError> {
    let service = demo_service();

    let date_a = NaiveDate::from_ymd_opt(2026, 9, 1).unwrap_or_default();
    let date_b = NaiveDate::from_ymd_opt(2026, 9, 2).unwrap_or_default();
    let driver = DriverId(501);

    println!("Shift slot assignment demo");
    println!("Driver: {driver}  Dates: {date_a}, {date_b}");
    println!();

    let opener = service.create_schedule(CreateScheduleRequest {
        user_id: UserId(1),
        pickup_location: "Shivajinagar".to_string(),
        drop_location: "Hinjewadi Phase 2".to_string(),
        time: "09:00".to_string(),
        return_time: None,
        shift: Some("morning".to_string()),
        cab_type: Some("Sedan".to_string()),
        dates: vec![date_a, date_b],
    })?;
    println!(
        "Booking {}: {} at 09:00 (Sedan, both dates)",
        opener.id,
        opener.route_description()
    );
    render_report(&service.assign_driver(opener.id, driver));

    let joiner = service.create_schedule(CreateScheduleRequest {
        user_id: UserId(2),
        pickup_location: "Aundh".to_string(),
        drop_location: "Wakad".to_string(),
        time: "09:25".to_string(),
        return_time: None,
        shift: Some("morning".to_string()),
        cab_type: Some("Sedan".to_string()),
        dates: vec![date_a, date_b],
    })?;
    println!(
        "Booking {}: {} at 09:25 (Sedan, both dates)",
        joiner.id,
        joiner.route_description()
    );
    render_report(&service.assign_driver(joiner.id, driver));

    let mismatched = service.create_schedule(CreateScheduleRequest {
        user_id: UserId(1),
        pickup_location: "Aundh".to_string(),
        drop_location: "Wakad".to_string(),
        time: "09:40".to_string(),
        return_time: None,
        shift: Some("morning".to_string()),
        cab_type: Some("SUV".to_string()),
        dates: vec![date_a],
    })?;
    println!(
        "Booking {}: {} at 09:40 (SUV, one date)",
        mismatched.id,
        mismatched.route_description()
    );
    render_report(&service.assign_driver(mismatched.id, driver));

    render_driver_slots(&service, driver)?;
    Ok(())
}

fn demo_service() -> SchedulingService {
    let store = Arc::new(InMemoryBookingStore::new());
    let directory = Arc::new(server::seeded_directory());

    let mut provider = StaticTableProvider::new();
    provider.set_coordinates("Shivajinagar", 18.530, 73.850);
    provider.set_coordinates("Hinjewadi Phase 2", 18.590, 73.700);
    provider.set_coordinates("Aundh", 18.560, 73.810);
    provider.set_coordinates("Wakad", 18.600, 73.760);
    provider.set_distance("Shivajinagar", "Hinjewadi Phase 2", 10_000.0);
    provider.set_distance("Shivajinagar", "Aundh", 2_000.0);
    provider.set_distance("Aundh", "Hinjewadi Phase 2", 8_500.0);
    provider.set_distance("Aundh", "Wakad", 8_000.0);
    provider.set_distance("Hinjewadi Phase 2", "Wakad", 1_500.0);
    provider.set_distance("Shivajinagar", "Wakad", 9_000.0);
    let checker = RouteCompatibilityChecker::new(Arc::new(provider));

    SchedulingService::new(
        store,
        directory.clone(),
        directory.clone(),
        directory,
        checker,
    )
}

fn render_report(report: &MultiDateReport) {
    for (date, outcome) in &report.outcomes {
        match outcome {
            DateOutcome::Assigned { slot_id, message } => {
                println!("  {date}: assigned to {slot_id} ({message})");
            }
            DateOutcome::Rejected {
                failure,
                suggestions,
            } => {
                println!("  {date}: rejected ({failure})");
                for suggestion in suggestions {
                    println!("    - {suggestion}");
                }
            }
        }
    }
    println!(
        "  {}/{} dates assigned",
        report.assigned_count(),
        report.outcomes.len()
    );
    println!();
}

fn render_driver_slots(service: &SchedulingService, driver: DriverId) -> Result<(), AppError> {
    let view = service.driver_slots(driver)?;
    println!("Slots for driver {}", view.driver_id);
    for slot in &view.slots {
        let label = slot
            .slot_id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "unslotted".to_string());
        println!("  {} on {} ({} riders)", label, slot.date, slot.booking_count);
        for member in &slot.bookings {
            println!(
                "    booking {} pickup {} from {} to {}",
                member.booking_id, member.pickup_time, member.pickup_location, member.drop_location
            );
        }
    }
    Ok(())
}

use anyhow::Context;
use chrono::{Duration, NaiveDate};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use opd_core::admin::{NewDoctor, NewSlot};
use opd_core::store::memory::MemoryStore;
use opd_core::{
    CreateTokenInput, EngineConfig, FixedClock, IdempotencyKey, OpDeadline, Priority, SeatCap,
    Source, TokenEngine,
};
use opd_types::{ClinicDate, ClockTime, NonEmptyText};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "opd")]
#[command(about = "OPD token allocation engine CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk through a scripted clinic day on the in-memory store
    Demo {
        /// Clinic date, DD-MM-YYYY (defaults to 02-08-2026)
        #[arg(long)]
        date: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("opd=info".parse()?))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Demo { date }) => {
            let date = date.as_deref().unwrap_or("02-08-2026");
            let date = ClinicDate::parse(date).context("invalid --date")?;
            run_demo(date)
        }
        None => {
            println!("Use 'opd --help' for commands");
            Ok(())
        }
    }
}

/// Seeds a doctor with a morning schedule and plays through admissions, an
/// emergency displacement, a cancellation with backfill, and end-of-day
/// expiry.
fn run_demo(date: ClinicDate) -> anyhow::Result<()> {
    let day: NaiveDate = date.as_naive();
    let clock = Arc::new(FixedClock::new(day.and_hms_opt(8, 0, 0).expect("valid time")));
    let engine = TokenEngine::new(MemoryStore::new(), clock.clone(), EngineConfig::default());

    let doctor = engine.register_doctor(NewDoctor {
        name: NonEmptyText::new("Dr. Rao")?,
        code: "D01".to_string(),
    })?;
    println!("Registered {} ({})", doctor.name, doctor.code);

    for (start, end, capacity, paid_cap) in [
        ("09:00", "10:00", 2, SeatCap::Unlimited),
        ("10:00", "11:00", 2, SeatCap::Cap(1)),
        ("11:00", "12:00", 3, SeatCap::Unlimited),
    ] {
        let slot = engine.register_slot(NewSlot {
            doctor_id: doctor.id,
            date,
            start: ClockTime::parse(start)?,
            end: ClockTime::parse(end)?,
            capacity,
            paid_cap,
            follow_up_cap: SeatCap::Unlimited,
        })?;
        println!(
            "Slot {}: {}-{} capacity {} (paid cap: {})",
            slot.display_id, start, end, capacity, slot.paid_cap
        );
    }

    println!("\n-- Morning admissions --");
    let admissions = [
        ("alice", Priority::Online, Source::Online),
        ("bob", Priority::Walkin, Source::Walkin),
        ("carol", Priority::Paid, Source::Online),
        ("dave", Priority::FollowUp, Source::Online),
        ("erin", Priority::Walkin, Source::Walkin),
        ("grace", Priority::Online, Source::Online),
        ("heidi", Priority::Walkin, Source::Walkin),
        ("ivan", Priority::FollowUp, Source::Online),
    ];
    let mut created = Vec::new();
    for (name, priority, source) in admissions {
        let outcome = engine.create_token(
            CreateTokenInput {
                doctor_id: doctor.id,
                date,
                idempotency_key: IdempotencyKey::new(format!("demo-{}", name))?,
                patient_name: NonEmptyText::new(name)?,
                phone: None,
                age: None,
                notes: None,
                source,
                priority,
            },
            OpDeadline::NONE,
        )?;
        println!(
            "{} [{}]: {}",
            outcome.token.display_id, priority, outcome.message
        );
        created.push(outcome.token);
        clock.advance(Duration::minutes(2));
    }

    println!("\n-- Emergency arrival --");
    let emergency = engine.create_token(
        CreateTokenInput {
            doctor_id: doctor.id,
            date,
            idempotency_key: IdempotencyKey::new("demo-emergency")?,
            patient_name: NonEmptyText::new("frank")?,
            phone: None,
            age: None,
            notes: None,
            source: Source::Walkin,
            priority: Priority::Emergency,
        },
        OpDeadline::NONE,
    )?;
    println!("{}: {}", emergency.token.display_id, emergency.message);
    for displaced in &emergency.displaced {
        match &displaced.reassigned_slot {
            Some(slot) => println!(
                "  displaced {} -> re-placed into {}",
                displaced.token.display_id, slot.display_id
            ),
            None => println!("  displaced {} -> waiting", displaced.token.display_id),
        }
    }

    println!("\n-- Cancellation at 09:20 --");
    clock.set(day.and_hms_opt(9, 20, 0).expect("valid time"));
    let cancelled = engine.cancel_token(created[0].id, OpDeadline::NONE)?;
    println!("{}: {}", cancelled.token.display_id, cancelled.message);
    for promoted in &cancelled.promoted {
        println!(
            "  promoted {} into {}",
            promoted.token.display_id, promoted.slot.display_id
        );
    }

    println!("\n-- Availability --");
    for entry in engine.slot_availability(doctor.id, day)? {
        println!(
            "{}: {}/{} seats taken{}",
            entry.slot.display_id,
            entry.allocated,
            entry.slot.capacity,
            if entry.has_ended { " (ended)" } else { "" }
        );
    }

    let waiting = engine.waiting_list(doctor.id, day)?;
    println!("\n-- Waiting list ({}) --", waiting.len());
    for token in &waiting {
        println!("{} [{}]", token.display_id, token.priority);
    }

    println!("\n-- End of day --");
    clock.set(day.and_hms_opt(18, 0, 0).expect("valid time"));
    let expired = engine.expire_waiting(doctor.id, day, OpDeadline::NONE)?;
    println!("Expired {} waiting token(s)", expired);

    println!("\n-- Audit trail --");
    for event in engine.audit_trail(doctor.id, day)? {
        println!(
            "{} {}{}",
            event.recorded_at.format("%H:%M"),
            event.operation,
            event
                .details
                .get(opd_core::constants::DETAIL_DISPLAY_ID)
                .map(|id| format!(" {}", id))
                .unwrap_or_default()
        );
    }

    Ok(())
}

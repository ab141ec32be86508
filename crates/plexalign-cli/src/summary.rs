use std::path::Path;

use console::Style;
use plexalign_core::pipeline::{RegistrationConfig, RegistrationOutcome, RoundState};
use plexalign_core::report::{DisplacementReport, DisplacementStatus};
use plexalign_core::set::RegistrationSet;

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
    warning: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
            warning: Style::new().red().bold(),
        }
    }
}

fn format_bytes(bytes: u64) -> String {
    let gb = bytes as f64 / (1024.0 * 1024.0 * 1024.0);
    if gb >= 1.0 {
        format!("{gb:.1} GB")
    } else {
        format!("{:.0} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

pub fn print_run_summary(
    config: &RegistrationConfig,
    set: &RegistrationSet,
    input: &Path,
    output: &Path,
    available_memory: Option<u64>,
) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Multiplex Registration"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(22)));
    println!();

    println!(
        "  {:<14}{}",
        s.label.apply_to("Input"),
        s.path.apply_to(input.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Output"),
        s.path.apply_to(output.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Rounds"),
        s.value.apply_to(set.round_count())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Frames"),
        s.value.apply_to(set.frame_count())
    );
    println!();

    println!("  {}", s.header.apply_to("Registration"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Anchor"),
        s.method.apply_to(&config.anchor)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Boundary"),
        s.method.apply_to(config.boundary)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Decimation"),
        s.value
            .apply_to(format!("+1 per {} px", config.downsample_threshold))
    );
    match available_memory {
        Some(bytes) => println!(
            "    {:<12}{}",
            s.label.apply_to("Memory"),
            s.value.apply_to(format!(
                "{:.0}% of {}",
                config.memory_fraction * 100.0,
                format_bytes(bytes)
            ))
        ),
        None => println!(
            "    {:<12}{}",
            s.label.apply_to("Memory"),
            s.disabled.apply_to("unchecked")
        ),
    }
    println!();
}

pub fn print_outcome(outcome: &RegistrationOutcome) {
    let s = Styles::new();

    println!();
    println!("  {}", s.header.apply_to("Result"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Canvas"),
        s.value.apply_to(format!(
            "{}x{}",
            outcome.canvas.width, outcome.canvas.height
        ))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Anchor"),
        s.value.apply_to(&outcome.anchor)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Decimation"),
        s.value.apply_to(format!("{}x", outcome.decimation_factor))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Written"),
        s.value.apply_to(outcome.frames_written)
    );
    let failed_rounds = outcome
        .states
        .values()
        .filter(|state| matches!(state, RoundState::Failed(_)))
        .count();
    if failed_rounds > 0 {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Failed"),
            s.warning.apply_to(format!("{failed_rounds} round(s)"))
        );
    }
    println!();

    print_displacements(&s, &outcome.report);

    if !outcome.frame_failures.is_empty() {
        println!("  {}", s.header.apply_to("Failed frames"));
        for failure in &outcome.frame_failures {
            println!(
                "    {:<16}{}",
                s.warning.apply_to(failure.frame.to_string()),
                s.label.apply_to(&failure.reason)
            );
        }
        println!();
    }
}

/// Ranked displacement table, worst match first.
fn print_displacements(s: &Styles, report: &DisplacementReport) {
    if report.is_empty() {
        println!(
            "  {:<14}{}",
            s.header.apply_to("Displacements"),
            s.disabled.apply_to("single round, nothing registered")
        );
        println!();
        return;
    }

    println!("  {}", s.header.apply_to("Displacements"));
    println!(
        "    {:<8}{:>10}{:>10}{:>10}{:>10}  {}",
        s.label.apply_to("Round"),
        s.label.apply_to("dy"),
        s.label.apply_to("dx"),
        s.label.apply_to("Error"),
        s.label.apply_to("Phase"),
        s.label.apply_to("Status")
    );
    for entry in report.entries() {
        let error = entry
            .error
            .map(|e| format!("{e:.4}"))
            .unwrap_or_else(|| "-".to_string());
        let status = match entry.status {
            DisplacementStatus::Estimated => s.method.apply_to(entry.status.to_string()),
            DisplacementStatus::LowSignal => s.disabled.apply_to(entry.status.to_string()),
            DisplacementStatus::Failed(_) => s.warning.apply_to(entry.status.to_string()),
        };
        println!(
            "    {:<8}{:>10.2}{:>10.2}{:>10}{:>10.3}  {}",
            entry.round.as_str(),
            entry.shift.dy,
            entry.shift.dx,
            error,
            entry.phase,
            status
        );
    }
    println!();
}

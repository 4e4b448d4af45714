/// Print the tables of a `MetricReport`
pub (super) fn print(report: &MetricReport) {
    println!();
    println!("Spectra");
    println!("  {:>7}  {:>14}  {:>12}", "channel", "photons/mm²", "mean keV");
    for (channel, spectrum) in Channel::BOTH.iter().zip(&report.spectra) {
        println!("  {:>7}  {:>14.4e}  {:>12.2}", channel.to_string(), spectrum.total_fluence(), spectrum.mean_energy());
    }

    if !report.rois.is_empty() {
        println!();
        println!("Regions of interest");
        println!("  {:<16} {:>7} {:>6} {:>12} {:>10} {:>10} {:>8}", "roi", "channel", "n", "mean", "SNR", "CNR", "DQE");
        for roi in &report.rois {
            for c in &roi.channels {
                println!("  {:<16} {:>7} {:>6} {:>12.4e} {:>10} {:>10} {:>8}{}",
                         roi.name, c.channel.to_string(), c.foreground.n, c.foreground.mean,
                         optional(c.snr, 2), optional(c.cnr, 3), optional(c.dqe, 4),
                         if roi.low_confidence() { "  (low confidence)" } else { "" });
            }
        }
    }

    if let Some(result) = &report.decomposition {
        println!();
        let (singular, other) = result.failures();
        println!("Decomposition into {} + {}: {} of {} pixels invalid ({} singular, {} not converged)",
                 result.basis[0], result.basis[1],
                 group_digits(singular + other), group_digits(result.entries.len()),
                 group_digits(singular), group_digits(other));
        if let Some(error) = &report.decomposition_error {
            print_decomposition_error("all pixels", error);
        }
        for roi in &report.rois {
            if let Some(error) = &roi.decomposition { print_decomposition_error(&roi.name, error) }
        }
    }

    if let Some(dqe) = &report.dqe {
        println!();
        println!("Detector (open beam): Swank factor low {:.4}, high {:.4}", dqe.swank[0], dqe.swank[1]);
        println!("  {:>10}  {:>8}  {:>8}", "cycles/mm", "DQE low", "DQE high");
        for (f, [low, high]) in &dqe.frequency {
            println!("  {f:>10.2}  {low:>8.4}  {high:>8.4}");
        }
    }

    for table in &report.subtraction {
        println!();
        println!("Subtraction cancelling `{}` (w = {:.4}): `{}` features", table.cancelled, table.weight, table.examined);
        println!("  {:>7} {:>10} {:>12} {:>10} {:>12} {:>8}", "feature", "mm", "signal", "noise", "contrast", "CNR");
        for row in &table.rows {
            println!("  {:>7} {:>10.2} {:>12.4e} {:>10.3e} {:>12.3e} {:>8.3}",
                     row.feature, mm_(row.thickness), row.signal, row.noise, row.contrast, row.cnr);
        }
    }
}

fn print_decomposition_error(label: &str, error: &DecompositionError) {
    println!("  {label}: {} valid, {} invalid ({:.2}%)", error.n_valid, error.n_invalid, 100.0 * error.invalid_fraction());
    for m in &error.materials {
        println!("    {:<12} bias {:>12} cm   std {:>12} cm", m.material, optional_e(m.bias), optional_e(m.std_dev));
    }
}

/// One line per low-energy setting of a sweep
pub (super) fn print_sweep(results: &[(f64, desim::Result<MetricReport>)]) {
    println!();
    println!("{:>8}  {:>10}  {:>9}  {:<40}", "low kV", "low keV", "invalid", "CNR per ROI (low, high)");
    for (kvp, result) in results {
        match result {
            Ok(report) => {
                let invalid = report.decomposition.as_ref()
                    .map_or_else(|| "-".to_string(), |d| format!("{:.2}%", 100.0 * d.invalid_fraction()));
                let cnrs = report.rois.iter()
                    .map(|r| format!("{}: ({}, {})", r.name, optional(r.channels[0].cnr, 2), optional(r.channels[1].cnr, 2)))
                    .collect::<Vec<_>>()
                    .join("  ");
                println!("{kvp:>8.1}  {:>10.2}  {invalid:>9}  {cnrs}", report.spectra[0].mean_energy());
            },
            Err(e) => println!("{kvp:>8.1}  failed: {e}"),
        }
    }
}

fn optional(x: Option<f64>, precision: usize) -> String {
    x.map_or_else(|| "-".into(), |x| format!("{x:.precision$}"))
}

fn optional_e(x: Option<f64>) -> String {
    x.map_or_else(|| "-".into(), |x| format!("{x:.3e}"))
}

// ----- Imports -----------------------------------------------------------------------------------------
use desim::{
    MetricReport,
    fom::DecompositionError,
    imaging::Channel,
    utils::group_digits,
};
use units::mm_;

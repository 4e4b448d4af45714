/// Progress bar for the settings of a `desim sweep`
pub (super) struct Progress(ProgressBar);

impl Progress {

    pub (super) fn new(n_settings: usize) -> Result<Self, TemplateError> {
        let bar = ProgressBar::new(n_settings as u64);
        bar.set_style(ProgressStyle::default_bar()
                      .template("Low-energy setting: {msg}\n[{elapsed_precise}] {wide_bar} {pos}/{len} ({eta_precise})")?
        );
        bar.tick();
        Ok(Self(bar))
    }

    pub (super) fn start(&self, kvp: f64) {
        self.0.set_message(format!("{kvp} kV"));
    }

    pub (super) fn done(&self) { self.0.inc(1) }

    pub (super) fn final_report(&self, n_failed: usize) {
        if n_failed == 0 { self.0.finish_with_message("all settings simulated") }
        else             { self.0.finish_with_message(format!("{n_failed} settings failed")) }
    }
}

// ----- Imports -----------------------------------------------------------------------------------------
use indicatif::{ProgressBar, ProgressStyle, style::TemplateError};

//! eframe application showing one trace.

use super::{plot_points, TracePlotOptions};
use crate::error::{AppResult, SpecAnError};
use crate::instrument::{Peak, Trace};
use eframe::egui;
use egui_plot::{Legend, Line, Plot, PlotPoints, Points};

/// Single-trace viewer window
pub struct TraceViewer {
    points: Vec<[f64; 2]>,
    peak: Option<Peak>,
    options: TracePlotOptions,
}

impl TraceViewer {
    /// Create a viewer for `trace`
    pub fn new(trace: &Trace, options: TracePlotOptions) -> Self {
        Self {
            points: plot_points(trace),
            peak: trace.peak(),
            options,
        }
    }
}

impl eframe::App for TraceViewer {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::TopBottomPanel::top("trace_header").show(ctx, |ui| {
            ui.heading(&self.options.title);
            match self.peak {
                Some(peak) => ui.label(format!(
                    "{} points, peak {:.2} dBm at {} Hz",
                    self.points.len(),
                    peak.amplitude_dbm,
                    peak.frequency_hz
                )),
                None => ui.label(format!("{} points", self.points.len())),
            };
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            if self.points.is_empty() {
                ui.label("No data available");
                return;
            }

            let line = Line::new(PlotPoints::from(self.points.clone())).name("Trace A");

            Plot::new("spectrum_trace")
                .x_axis_label(self.options.x_label.clone())
                .y_axis_label(self.options.y_label.clone())
                .legend(Legend::default())
                .show(ui, |plot_ui| {
                    plot_ui.line(line);
                    if let Some(peak) = self.peak {
                        plot_ui.points(
                            Points::new(vec![[peak.frequency_hz, peak.amplitude_dbm]])
                                .radius(4.0)
                                .name("Peak"),
                        );
                    }
                });
        });
    }
}

/// Run the viewer on the calling thread until its window closes.
pub(super) fn run(trace: Trace, options: TracePlotOptions) -> AppResult<()> {
    tracing::info!("Opening trace viewer ({} points)", trace.len());

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size(options.size)
            .with_title(options.title.clone()),
        ..Default::default()
    };

    let title = options.title.clone();
    let viewer = TraceViewer::new(&trace, options);

    eframe::run_native(&title, native_options, Box::new(|_cc| Ok(Box::new(viewer))))
        .map_err(|e| SpecAnError::Render(e.to_string()))
}

use motion_harness_pipeline::lifecycle::{ShutdownCause, ShutdownHandle};
use motion_harness_pipeline::media::{HostWindow, Region, Surface, SurfaceKind};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Terminal stand-in for a desktop window. Surfaces are logged as they are
/// docked, and Ctrl-C plays the part of the window's close button.
pub struct ConsoleWindow {
    runtime: Handle,
    title: String,
    surfaces: Vec<(Region, Surface)>,
    close_listener: Option<JoinHandle<()>>,
}

impl ConsoleWindow {
    pub fn new(runtime: Handle, title: String) -> Self {
        Self {
            runtime,
            title,
            surfaces: Vec::new(),
            close_listener: None,
        }
    }

    /// Logs what the visual surface ended up presenting.
    pub fn report(&self) {
        for (_, surface) in &self.surfaces {
            if surface.kind == SurfaceKind::Visual {
                info!(
                    surface = surface.label,
                    frames = surface.stats.frames(),
                    motion_frames = surface.stats.motion_frames(),
                    "playback summary"
                );
            }
        }
    }
}

impl HostWindow for ConsoleWindow {
    fn attach(&mut self, surface: Surface, region: Region) {
        info!(window = self.title, surface = surface.label, ?region, "surface attached");
        self.surfaces.push((region, surface));
    }

    fn show(&mut self) {
        info!(
            window = self.title,
            surfaces = self.surfaces.len(),
            "window shown, press Ctrl-C to close"
        );
    }

    fn on_close(&mut self, hook: ShutdownHandle) {
        let title = self.title.clone();
        let task = self.runtime.spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!(window = title, "window closing");
                    hook.request(ShutdownCause::WindowClosed);
                }
                Err(e) => warn!(error = %e, "cannot listen for Ctrl-C, window can only end with the stream"),
            }
        });
        if let Some(previous) = self.close_listener.replace(task) {
            previous.abort();
        }
    }
}

impl Drop for ConsoleWindow {
    fn drop(&mut self) {
        if let Some(task) = self.close_listener.take() {
            task.abort();
        }
    }
}

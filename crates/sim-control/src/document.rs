//! Project document
//!
//! Ties one package on disk to one simulation controller. The document owns
//! the file set; the controller only ever receives a copy at build time, so
//! edits made while a session runs do not reach the running device.

use std::fs;
use std::path::{Path, PathBuf};

use sim_package::{FormatError, Package, VirtualFileSet};
use sim_runtime::{BuildError, BuildOptions, RuntimeLoader, ScriptLoader};
use tracing::{info, warn};

use crate::controller::{SimulationController, SimulationState, TickReport};
use crate::error::{ControlError, DocumentError};

/// Name used for documents without one
const UNTITLED: &str = "Untitled";

/// An open project
pub struct ProjectDocument<L = ScriptLoader> {
    name: String,
    path: Option<PathBuf>,
    package: Package,
    controller: SimulationController<L>,
    dirty: bool,
}

impl ProjectDocument<ScriptLoader> {
    /// Create an empty, unsaved project
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_controller(name, SimulationController::new())
    }

    /// Open a package directory
    pub fn open(path: &Path) -> Result<Self, DocumentError> {
        Self::open_with(path, SimulationController::new())
    }
}

impl<L: RuntimeLoader> ProjectDocument<L> {
    /// Create an empty project driven by `controller`
    pub fn with_controller(name: impl Into<String>, controller: SimulationController<L>) -> Self {
        Self {
            name: name.into(),
            path: None,
            package: Package::new(),
            controller,
            dirty: false,
        }
    }

    /// Open a package directory with a specific controller
    ///
    /// A package without a usable files collection opens as an empty
    /// project. Failing to read the directory, or `path` not being a
    /// directory, is an error.
    pub fn open_with(
        path: &Path,
        controller: SimulationController<L>,
    ) -> Result<Self, DocumentError> {
        let package = Package::read_dir(path)?;
        if let Some(e) = package.load_error() {
            warn!("{} opened without files: {}", path.display(), e);
        }
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| UNTITLED.to_string());
        info!("Opened {} ({} files)", name, package.files().len());

        Ok(Self {
            name,
            path: Some(path.to_path_buf()),
            package,
            controller,
            dirty: false,
        })
    }

    /// Write the package to `path`, reusing its container
    pub fn save(&mut self, path: &Path) -> Result<(), DocumentError> {
        self.package.write_dir(path)?;
        self.path = Some(path.to_path_buf());
        self.dirty = false;
        Ok(())
    }

    /// Save to the path the document was opened from or last saved to
    pub fn save_in_place(&mut self) -> Result<(), DocumentError> {
        let Some(path) = self.path.clone() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "document has never been saved",
            )
            .into());
        };
        self.save(&path)
    }

    /// Replace every file with the contents of a binary image
    ///
    /// Nothing is merged: files missing from the image are gone afterwards.
    /// Returns the number of files imported.
    pub fn import_binary(&mut self, path: &Path) -> Result<usize, DocumentError> {
        let bytes = fs::read(path)?;
        let files = VirtualFileSet::import_binary(&bytes)?;
        let count = files.len();
        info!(
            "Imported {} files from {}, replacing {}",
            count,
            path.display(),
            self.package.files().len()
        );
        self.package.set_files(files);
        self.dirty = true;
        Ok(count)
    }

    /// Write every file to a binary image
    pub fn export_binary(&self, path: &Path) -> Result<(), DocumentError> {
        let image = self.package.files().export_binary()?;
        fs::write(path, &image)?;
        info!(
            "Exported {} files ({} bytes) to {}",
            self.package.files().len(),
            image.len(),
            path.display()
        );
        Ok(())
    }

    /// Project name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path the document lives at, once saved or opened
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether files changed since the last save
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Why the package opened without files, if it did
    pub fn load_error(&self) -> Option<&FormatError> {
        self.package.load_error()
    }

    /// Package files kept out of the project because the device cannot name them
    pub fn unrecognized_paths(&self) -> impl Iterator<Item = &str> {
        self.package.unrecognized_paths()
    }

    /// Project files
    pub fn files(&self) -> &VirtualFileSet {
        self.package.files()
    }

    /// Mutable project files; marks the document dirty
    pub fn files_mut(&mut self) -> &mut VirtualFileSet {
        self.dirty = true;
        self.package.files_mut()
    }

    /// The simulation controller
    pub fn controller(&self) -> &SimulationController<L> {
        &self.controller
    }

    /// The simulation controller, mutably
    pub fn controller_mut(&mut self) -> &mut SimulationController<L> {
        &mut self.controller
    }

    /// Build a snapshot of the current files
    pub fn build(&mut self) -> Result<(), BuildError> {
        self.build_with(BuildOptions::default())
    }

    /// Build a snapshot of the current files with explicit options
    pub fn build_with(&mut self, options: BuildOptions) -> Result<(), BuildError> {
        let files = self.package.files().clone();
        self.controller.build_with(files, &self.name, options)
    }

    /// Build and run a snapshot of the current files
    pub fn simulate(&mut self) -> Result<(), BuildError> {
        self.simulate_with(BuildOptions::default())
    }

    /// Build with explicit options and run
    pub fn simulate_with(&mut self, options: BuildOptions) -> Result<(), BuildError> {
        let files = self.package.files().clone();
        self.controller.simulate_with(files, &self.name, options)
    }

    /// Start or resume the simulation
    pub fn run(&mut self) -> Result<(), ControlError> {
        self.controller.run()
    }

    /// Pause the simulation
    pub fn pause(&mut self) -> Result<(), ControlError> {
        self.controller.pause()
    }

    /// Stop the simulation
    pub fn stop(&mut self) -> Result<(), ControlError> {
        self.controller.stop()
    }

    /// Advance the simulation by one tick
    pub fn tick(&mut self) -> Option<TickReport> {
        self.controller.tick()
    }

    /// Simulation state
    pub fn state(&self) -> SimulationState {
        self.controller.state()
    }

    /// Whether `run` would be accepted
    pub fn can_run(&self) -> bool {
        self.controller.can_run()
    }

    /// Whether `pause` would be accepted
    pub fn can_pause(&self) -> bool {
        self.controller.can_pause()
    }

    /// Whether `stop` would be accepted
    pub fn can_stop(&self) -> bool {
        self.controller.can_stop()
    }
}

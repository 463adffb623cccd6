//! Scoped teardown for a build in progress.
//!
//! The guard owns the [`ResourceSet`] and the workspace path for the whole
//! build. Dropping it while armed (error return, panic, interruption)
//! unmounts, detaches, removes the workspace and deletes both outputs.
//! A successful build disarms it first.

use anyhow::anyhow;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::error::BuildError;
use super::host::DiskHost;
use super::resources::{ResourceKind, ResourceSet, Slot};
use crate::common::temp;

pub struct FailureGuard<'h, H: DiskHost + ?Sized> {
    host: &'h H,
    resources: ResourceSet,
    workspace: Option<PathBuf>,
    outputs: Vec<PathBuf>,
    armed: bool,
}

impl<'h, H: DiskHost + ?Sized> FailureGuard<'h, H> {
    /// Arm a guard that will delete `outputs` if the build does not finish.
    pub fn arm(host: &'h H, outputs: &[&Path]) -> Self {
        Self {
            host,
            resources: ResourceSet::new(),
            workspace: None,
            outputs: outputs.iter().map(|p| p.to_path_buf()).collect(),
            armed: true,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn resources(&self) -> &ResourceSet {
        &self.resources
    }

    /// Record a resource the host just handed out.
    ///
    /// If the slot is somehow already taken, the new resource is released
    /// again right away so nothing untracked stays on the host.
    pub fn track(
        &mut self,
        kind: ResourceKind,
        slot: Slot,
        path: PathBuf,
    ) -> Result<(), BuildError> {
        match self.resources.attach(kind, slot, path.clone()) {
            Ok(()) => {
                log::debug!("Attached {} {} at {}", slot, kind, path.display());
                Ok(())
            }
            Err(conflict) => {
                if let Err(e) = self.release_on_host(kind, &path) {
                    log::warn!("Failed to release untracked {} {}: {:#}", kind, path.display(), e);
                }
                Err(BuildError::resource(
                    format!("tracking the {} {}", slot, kind),
                    anyhow!(conflict),
                ))
            }
        }
    }

    fn release_on_host(&self, kind: ResourceKind, path: &Path) -> anyhow::Result<()> {
        match kind {
            ResourceKind::Mount => self.host.unmount(path),
            ResourceKind::Loop => self.host.detach_loop(path),
        }
    }

    /// Release one resource. Releasing an unused slot does nothing.
    pub fn release(&mut self, kind: ResourceKind, slot: Slot) -> Result<(), BuildError> {
        let Some(path) = self.resources.get(kind, slot).map(Path::to_path_buf) else {
            return Ok(());
        };
        self.release_on_host(kind, &path).map_err(|e| {
            let verb = match kind {
                ResourceKind::Mount => "unmounting",
                ResourceKind::Loop => "detaching",
            };
            BuildError::resource(format!("{} the {} {}", verb, slot, kind), e)
        })?;
        self.resources.release(kind, slot);
        log::debug!("Released {} {} at {}", slot, kind, path.display());
        Ok(())
    }

    pub fn set_workspace(&mut self, path: PathBuf) {
        self.workspace = Some(path);
    }

    pub fn workspace(&self) -> Option<&Path> {
        self.workspace.as_deref()
    }

    /// Remove the workspace, unless something is still mounted below it.
    pub fn remove_workspace(&mut self) -> Result<(), BuildError> {
        let Some(workspace) = self.workspace.take() else {
            return Ok(());
        };
        if self.resources.any_mounted() {
            let err = anyhow!("mounts are still attached below {}", workspace.display());
            self.workspace = Some(workspace);
            return Err(BuildError::resource("removing the workspace", err));
        }
        temp::cleanup_work_dir(&workspace)
            .map_err(|e| BuildError::io("removing the workspace", e))
    }

    /// Release everything still attached, best effort.
    ///
    /// Every release is attempted even when an earlier one fails. Failed
    /// handles stay attached. Returns the failures.
    pub fn teardown(&mut self) -> Vec<BuildError> {
        let mut failures = Vec::new();
        for (kind, slot, _) in self.resources.attached_in_teardown_order() {
            if let Err(e) = self.release(kind, slot) {
                failures.push(e);
            }
        }
        if let Err(e) = self.remove_workspace() {
            failures.push(e);
        }
        failures
    }

    fn remove_outputs(&self) {
        for output in &self.outputs {
            match fs::remove_file(output) {
                Ok(()) => log::info!("Removed partial output {}", output.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("Failed to remove {}: {}", output.display(), e),
            }
        }
    }

    /// Mark the build complete. Returns the final resource state.
    pub fn disarm(mut self) -> ResourceSet {
        self.armed = false;
        std::mem::take(&mut self.resources)
    }
}

impl<H: DiskHost + ?Sized> Drop for FailureGuard<'_, H> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;

        log::warn!("Build aborted, releasing loop devices and mounts");
        for failure in self.teardown() {
            log::warn!("Cleanup incomplete: {:#}", anyhow!(failure));
        }
        if !self.resources.is_clear() {
            for (kind, slot, path) in self.resources.attached_in_teardown_order() {
                log::error!("Still attached: {} {} at {}", slot, kind, path.display());
            }
        }
        if let Some(workspace) = &self.workspace {
            log::error!("Workspace left in place: {}", workspace.display());
        }
        self.remove_outputs();
    }
}

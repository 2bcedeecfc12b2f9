use anyhow::{Context, Result};
use windows::Win32::Foundation::RPC_E_CHANGED_MODE;
use windows::Win32::System::Com::{CoInitializeEx, CoUninitialize, COINIT_MULTITHREADED};

/// Scoped multithreaded COM initialization for the capturing thread.
pub(crate) struct ComGuard {
    owns_init: bool,
}

impl ComGuard {
    pub(crate) fn init_multithreaded() -> Result<Self> {
        let hr = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) };
        // Another apartment model is already active on this thread. COM
        // stays usable for our calls, but the initialization is not ours
        // to undo.
        if hr == RPC_E_CHANGED_MODE {
            return Ok(Self { owns_init: false });
        }
        hr.ok()
            .context("CoInitializeEx(COINIT_MULTITHREADED) failed")?;
        Ok(Self { owns_init: true })
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        if self.owns_init {
            unsafe {
                CoUninitialize();
            }
        }
    }
}

//! Process-scoped COM initialization.

use std::marker::PhantomData;

use windows::Win32::System::Com::*;

use desktop_audio_core::models::error::FeedError;

/// COM multithreaded apartment for the current thread.
///
/// Create one in `main` before opening any stream and keep it alive until
/// every stream borrowed from it is dropped. `CoUninitialize` runs on drop.
pub struct ComApartment {
    // CoInitializeEx/CoUninitialize must pair on one thread
    _thread_bound: PhantomData<*const ()>,
}

impl ComApartment {
    pub fn initialize() -> Result<Self, FeedError> {
        unsafe {
            CoInitializeEx(None, COINIT_MULTITHREADED)
                .ok()
                .map_err(|e| FeedError::Unknown(format!("CoInitializeEx failed: {}", e)))?;
        }
        log::debug!("COM initialized (MTA)");
        Ok(Self {
            _thread_bound: PhantomData,
        })
    }
}

impl Drop for ComApartment {
    fn drop(&mut self) {
        unsafe {
            CoUninitialize();
        }
        log::debug!("COM uninitialized");
    }
}

use log::{info, warn};

/// The OpenGL version we render with
pub const DESIRED_OPENGL_VERSION: xr::Version = xr::Version::new(3, 3, 0);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("runtime does not support XR_KHR_opengl_enable, which this application requires")]
    OpenGlMissing,
}

/// Which of the extensions we care about the runtime offers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub hand_tracking: bool,
    pub display_refresh_rate: bool,
    pub vive_tracker: bool,
}

impl Capabilities {
    /// Records what `available` supports. OpenGL is the only hard requirement.
    pub fn from_available(available: &xr::ExtensionSet) -> Result<Self, CapabilityError> {
        if !available.khr_opengl_enable {
            return Err(CapabilityError::OpenGlMissing);
        }

        Ok(Self {
            hand_tracking: available.ext_hand_tracking,
            display_refresh_rate: available.fb_display_refresh_rate,
            vive_tracker: available.htcx_vive_tracker_interaction,
        })
    }

    /// The extensions to create the instance with
    pub fn enabled_extensions(&self) -> xr::ExtensionSet {
        let mut extensions = xr::ExtensionSet::default();
        extensions.khr_opengl_enable = true;
        extensions.ext_hand_tracking = self.hand_tracking;
        extensions.fb_display_refresh_rate = self.display_refresh_rate;
        extensions.htcx_vive_tracker_interaction = self.vive_tracker;
        extensions
    }

    /// Hand tracking needs both the extension and a system that can do it
    pub fn system_hand_tracking(&self, system_supports_it: bool) -> bool {
        self.hand_tracking && system_supports_it
    }
}

pub fn log_available_extensions(available: &xr::ExtensionSet) {
    let known = [
        ("XR_KHR_opengl_enable", available.khr_opengl_enable),
        ("XR_EXT_hand_tracking", available.ext_hand_tracking),
        ("XR_FB_display_refresh_rate", available.fb_display_refresh_rate),
        (
            "XR_HTCX_vive_tracker_interaction",
            available.htcx_vive_tracker_interaction,
        ),
    ];
    for (name, supported) in known {
        info!("\t{}: {}", name, if supported { "yes" } else { "no" });
    }
    for name in &available.other {
        info!("\t{} (unused)", name);
    }
}

/// Returns false (with a warning) if the runtime can't take our GL version.
/// Never fatal: runtimes report OpenGL requirements that are not useful.
pub fn check_opengl_version(requirements: &xr::opengl::Requirements) -> bool {
    let min = requirements.min_api_version_supported;
    let max = requirements.max_api_version_supported;
    if DESIRED_OPENGL_VERSION < min || DESIRED_OPENGL_VERSION > max {
        warn!(
            "We want OpenGL {}, but runtime only supports OpenGL {} - {}!",
            version_string(DESIRED_OPENGL_VERSION),
            version_string(min),
            version_string(max),
        );
        return false;
    }
    true
}

pub fn version_string(version: xr::Version) -> String {
    format!(
        "{}.{}.{}",
        version.major(),
        version.minor(),
        version.patch()
    )
}

/// Picks `preferred` if the runtime offers it. Otherwise the runtime's first
/// format if `fallback` is set, else nothing.
pub fn choose_swapchain_format(available: &[u32], preferred: u32, fallback: bool) -> Option<u32> {
    if available.contains(&preferred) {
        info!("Using preferred swapchain format {:#x}", preferred);
        return Some(preferred);
    }

    let chosen = if fallback { available.first().copied() } else { None };
    if let Some(format) = chosen {
        info!("Falling back to non preferred swapchain format {:#x}", format);
    }
    chosen
}

extern crate openxr as xr;
use anyhow::{bail, Result};
use glutin::{window::Window, ContextWrapper, PossiblyCurrent};
use xr::opengl::SessionCreateInfo;

pub mod capabilities;
pub mod config;
pub mod desktop;
pub mod desktop_camera;
pub mod input;
pub mod lifecycle;
pub mod math;
pub mod playground;
pub mod renderer;
pub mod scene;
pub mod swapchain;
pub mod tracking;

/// Graphics binding for a session that renders with the current GL context
/// of `ctx`, which belongs to `window`
pub fn session_create_info<T>(
    ctx: &ContextWrapper<PossiblyCurrent, T>,
    #[allow(unused_variables)] window: &Window,
) -> Result<SessionCreateInfo> {
    #[cfg(target_os = "windows")]
    unsafe {
        use glutin::platform::windows::RawHandle;
        use glutin::platform::windows::WindowExtWindows;
        use glutin::platform::ContextTraitExt;

        let hwnd = window.hwnd();
        let h_glrc = match ctx.raw_handle() {
            RawHandle::Wgl(h) => h,
            _ => bail!("Only WGL contexts can be shared with the OpenXR runtime"),
        };

        let h_dc = windows_sys::Win32::Graphics::Gdi::GetDC(hwnd as _);
        if h_dc == 0 {
            bail!("Failed to get the window's device context");
        }

        Ok(SessionCreateInfo::Windows {
            h_dc: std::mem::transmute(h_dc),
            h_glrc: std::mem::transmute(h_glrc),
        })
    }

    #[cfg(target_os = "linux")]
    unsafe {
        use glutin_glx_sys::glx::Glx;
        use std::ffi::c_void;
        let glx = Glx::load_with(|addr| ctx.get_proc_address(addr));

        let xlib = glutin_glx_sys::Xlib::open()?;

        let x_display = (xlib.XOpenDisplay)(std::ptr::null());
        if x_display.is_null() {
            bail!("Failed to open X display");
        }
        let glx_drawable = glx.GetCurrentDrawable();
        let glx_context = glx.GetCurrentContext();
        if glx_context.is_null() {
            bail!("No current GLX context, only GLX contexts can be shared with the OpenXR runtime");
        }

        Ok(SessionCreateInfo::Xlib {
            x_display: std::mem::transmute(x_display),
            visualid: 0,
            glx_fb_config: std::ptr::null::<c_void>() as _,
            glx_drawable,
            glx_context: std::mem::transmute(glx_context),
        })
    }
}

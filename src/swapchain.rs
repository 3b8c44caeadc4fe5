use anyhow::{bail, Context, Result};
use log::info;

/// How long to wait for a freshly acquired image, in nanoseconds
const IMAGE_WAIT_TIMEOUT_NANOS: i64 = 1_000_000_000_000;

/// A runtime swapchain plus the GL textures backing it
pub struct Swapchain {
    handle: xr::Swapchain<xr::OpenGL>,
    images: Vec<u32>,
    width: u32,
    height: u32,
    lease: ImageLease,
}

/// An image held between `acquire` and `release`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredImage {
    pub index: usize,
    /// GL texture name
    pub texture: u32,
}

impl Swapchain {
    pub fn new(
        session: &xr::Session<xr::OpenGL>,
        format: u32,
        sample_count: u32,
        width: u32,
        height: u32,
        usage_flags: xr::SwapchainUsageFlags,
    ) -> Result<Self> {
        let handle = session
            .create_swapchain(&xr::SwapchainCreateInfo::<xr::OpenGL> {
                create_flags: xr::SwapchainCreateFlags::EMPTY,
                usage_flags,
                format,
                sample_count,
                width,
                height,
                face_count: 1,
                array_size: 1,
                mip_count: 1,
            })
            .context("Failed to create swapchain")?;

        // The runtime controls how many images there are
        let images = handle
            .enumerate_images()
            .context("Failed to enumerate swapchain images")?;
        info!(
            "Created {}x{} swapchain with {} images, format {:#x}",
            width,
            height,
            images.len(),
            format
        );

        Ok(Self {
            handle,
            images,
            width,
            height,
            lease: ImageLease::default(),
        })
    }

    /// One swapchain per view, sized as the runtime recommends
    pub fn for_views(
        session: &xr::Session<xr::OpenGL>,
        views: &[xr::ViewConfigurationView],
        format: u32,
        usage_flags: xr::SwapchainUsageFlags,
    ) -> Result<Vec<Self>> {
        views
            .iter()
            .map(|view| {
                Self::new(
                    session,
                    format,
                    view.recommended_swapchain_sample_count,
                    view.recommended_image_rect_width,
                    view.recommended_image_rect_height,
                    usage_flags,
                )
            })
            .collect()
    }

    /// Acquires the next image and waits until it can be rendered to
    pub fn acquire(&mut self) -> Result<AcquiredImage> {
        self.lease.check_free()?;
        let index = self
            .handle
            .acquire_image()
            .context("failed to acquire swapchain image!")?;
        self.handle
            .wait_image(xr::Duration::from_nanos(IMAGE_WAIT_TIMEOUT_NANOS))
            .context("failed to wait for swapchain image!")?;
        let image = AcquiredImage {
            index: index as usize,
            texture: self.images[index as usize],
        };
        self.lease.acquire(image)?;
        Ok(image)
    }

    /// Hands the held image back to the runtime. It must not be touched after
    pub fn release(&mut self) -> Result<()> {
        self.lease.release()?;
        self.handle
            .release_image()
            .context("failed to release swapchain image!")
    }

    /// The image between `acquire` and `release`, if any
    pub fn held(&self) -> Option<AcquiredImage> {
        self.lease.held()
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// The whole image
    pub fn rect(&self) -> xr::Rect2Di {
        full_rect(self.width, self.height)
    }

    pub fn sub_image(&self) -> xr::SwapchainSubImage<'_, xr::OpenGL> {
        xr::SwapchainSubImage::new()
            .swapchain(&self.handle)
            .image_array_index(0)
            .image_rect(self.rect())
    }
}

pub fn full_rect(width: u32, height: u32) -> xr::Rect2Di {
    xr::Rect2Di {
        offset: xr::Offset2Di { x: 0, y: 0 },
        extent: xr::Extent2Di {
            width: width as i32,
            height: height as i32,
        },
    }
}

/// Tracks the single image an app may hold from one swapchain
#[derive(Debug, Default)]
struct ImageLease {
    held: Option<AcquiredImage>,
}

impl ImageLease {
    fn check_free(&self) -> Result<()> {
        if let Some(image) = self.held {
            bail!("swapchain image {} is still held", image.index);
        }
        Ok(())
    }

    fn acquire(&mut self, image: AcquiredImage) -> Result<()> {
        self.check_free()?;
        self.held = Some(image);
        Ok(())
    }

    fn release(&mut self) -> Result<AcquiredImage> {
        match self.held.take() {
            Some(image) => Ok(image),
            None => bail!("no swapchain image to release"),
        }
    }

    fn held(&self) -> Option<AcquiredImage> {
        self.held
    }
}

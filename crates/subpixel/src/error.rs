use thiserror::Error;

/// Failures reported by a camera/media collaborator.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("no camera matches the requested constraints")]
    NotFound,
    #[error("timed out waiting for the first decodable frame")]
    Timeout,
    #[error("camera device error: {0}")]
    Device(String),
    #[error("camera i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("GPU context not initialized")]
    NotInitialized,
    #[error("canvas not configured")]
    CanvasNotConfigured,
    #[error("render pipeline not created")]
    PipelineNotCreated,
    #[error("canvas cannot provide a GPU context")]
    ContextUnavailable,
    #[error("camera capture is not supported on this platform")]
    CameraUnsupported,
    #[error("camera not active")]
    CameraNotActive,
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error("invalid dimensions {width}x{height}; both axes must be positive")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("frame holds {actual} bytes, expected {expected} for {width}x{height} RGBA")]
    FrameSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("{width}x{height} exceeds the GPU texture limit of {limit}")]
    TextureTooLarge { width: u32, height: u32, limit: u32 },
    #[error("failed to find a suitable GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
    #[error("failed to create GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error("shader compilation failed: {0}")]
    Shader(String),
    #[error("GPU poll failed: {0}")]
    Poll(#[from] wgpu::PollError),
    #[error("surface readback failed: {0}")]
    Readback(String),
    #[error("failed to encode image: {0}")]
    Encode(#[source] image::ImageError),
    #[error("failed to load image: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, ProcessorError>;

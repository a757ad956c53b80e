//! Grab one raw frame from /dev/video0, video1 or video2.

use v4l_frame_grab::{grab, logging, CameraError, CaptureConfig, V4L2Device};

fn main() {
    logging::setup_logging();

    if let Err(err) = run() {
        match err {
            CameraError::Invocation(usage) => println!("{usage}"),
            err => eprintln!("Error: {err}"),
        }
        std::process::exit(1);
    }
}

fn run() -> v4l_frame_grab::traits::Result<()> {
    let config = CaptureConfig::from_args(std::env::args_os())?;

    tracing::info!(device = %config.selector.path().display(), "opening device");
    let device = V4L2Device::open(config.selector)?;

    let path = grab(device, &config, &mut std::io::stdout().lock())?;
    tracing::info!(path = %path.display(), "frame saved");

    Ok(())
}

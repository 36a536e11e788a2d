//! V4L2 webcam capture
//!
//! Memory-mapped streaming I/O on a `/dev/videoN` node. The device is asked
//! for MJPEG and falls back to YUYV; frames are converted to packed RGB.

use std::ffi::c_void;
use std::fs::{File, OpenOptions};
use std::io;
use std::mem;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::ptr;
use std::time::Instant;

use image::ImageFormat;
use tracing::{debug, info, warn};

use crate::{CameraError, FrameSource, VideoFrame};

const BUFFER_COUNT: u32 = 4;
const POLL_TIMEOUT_MS: i32 = 1000;

const BUF_TYPE_VIDEO_CAPTURE: u32 = 1;
const MEMORY_MMAP: u32 = 1;
const FIELD_NONE: u32 = 1;

const CAP_VIDEO_CAPTURE: u32 = 0x0000_0001;
const CAP_STREAMING: u32 = 0x0400_0000;
const CAP_DEVICE_CAPS: u32 = 0x8000_0000;

const fn fourcc(code: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*code)
}

const PIX_FMT_MJPEG: u32 = fourcc(b"MJPG");
const PIX_FMT_YUYV: u32 = fourcc(b"YUYV");

#[repr(C)]
#[allow(dead_code)]
struct Capability {
    driver: [u8; 16],
    card: [u8; 32],
    bus_info: [u8; 32],
    version: u32,
    capabilities: u32,
    device_caps: u32,
    reserved: [u32; 3],
}

#[repr(C)]
#[derive(Clone, Copy)]
#[allow(dead_code)]
struct PixFormat {
    width: u32,
    height: u32,
    pixelformat: u32,
    field: u32,
    bytesperline: u32,
    sizeimage: u32,
    colorspace: u32,
    priv_: u32,
    flags: u32,
    ycbcr_enc: u32,
    quantization: u32,
    xfer_func: u32,
}

#[repr(C)]
#[allow(dead_code)]
union FormatData {
    pix: PixFormat,
    raw: [u64; 25],
}

#[repr(C)]
struct Format {
    type_: u32,
    fmt: FormatData,
}

#[repr(C)]
#[allow(dead_code)]
struct RequestBuffers {
    count: u32,
    type_: u32,
    memory: u32,
    reserved: [u32; 2],
}

#[repr(C)]
#[allow(dead_code)]
struct Timecode {
    type_: u32,
    flags: u32,
    frames: u8,
    seconds: u8,
    minutes: u8,
    hours: u8,
    userbits: [u8; 4],
}

#[repr(C)]
#[allow(dead_code)]
union BufferLocation {
    offset: u32,
    userptr: libc::c_ulong,
}

#[repr(C)]
#[allow(dead_code)]
struct Buffer {
    index: u32,
    type_: u32,
    bytesused: u32,
    flags: u32,
    field: u32,
    timestamp: libc::timeval,
    timecode: Timecode,
    sequence: u32,
    memory: u32,
    m: BufferLocation,
    length: u32,
    reserved2: u32,
    request_fd: i32,
}

const IOC_WRITE: u64 = 1;
const IOC_READ: u64 = 2;

const fn ioc(dir: u64, nr: u64, size: usize) -> u64 {
    (dir << 30) | ((size as u64) << 16) | ((b'V' as u64) << 8) | nr
}

const VIDIOC_QUERYCAP: u64 = ioc(IOC_READ, 0, mem::size_of::<Capability>());
const VIDIOC_S_FMT: u64 = ioc(IOC_READ | IOC_WRITE, 5, mem::size_of::<Format>());
const VIDIOC_REQBUFS: u64 = ioc(IOC_READ | IOC_WRITE, 8, mem::size_of::<RequestBuffers>());
const VIDIOC_QUERYBUF: u64 = ioc(IOC_READ | IOC_WRITE, 9, mem::size_of::<Buffer>());
const VIDIOC_QBUF: u64 = ioc(IOC_READ | IOC_WRITE, 15, mem::size_of::<Buffer>());
const VIDIOC_DQBUF: u64 = ioc(IOC_READ | IOC_WRITE, 17, mem::size_of::<Buffer>());
const VIDIOC_STREAMON: u64 = ioc(IOC_WRITE, 18, mem::size_of::<i32>());
const VIDIOC_STREAMOFF: u64 = ioc(IOC_WRITE, 19, mem::size_of::<i32>());

/// Issue an ioctl, retrying when interrupted
fn xioctl<T>(fd: RawFd, request: u64, arg: &mut T) -> io::Result<()> {
    loop {
        // SAFETY: `arg` is a live, correctly sized repr(C) struct for `request`
        let ret = unsafe { libc::ioctl(fd, request as _, arg as *mut T) };
        if ret != -1 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

fn zeroed<T>() -> T {
    // SAFETY: only used for the plain-data V4L2 structs above
    unsafe { mem::zeroed() }
}

struct MappedBuffer {
    ptr: *mut c_void,
    len: usize,
}

impl Drop for MappedBuffer {
    fn drop(&mut self) {
        // SAFETY: `ptr`/`len` come from a successful mmap
        unsafe {
            libc::munmap(self.ptr, self.len);
        }
    }
}

/// Streaming V4L2 capture device
pub struct DeviceSource {
    path: PathBuf,
    file: File,
    buffers: Vec<MappedBuffer>,
    width: u32,
    height: u32,
    pixelformat: u32,
    sequence: u32,
    opened_at: Instant,
}

// SAFETY: the mapped buffers are only touched through `&mut self`
unsafe impl Send for DeviceSource {}

impl DeviceSource {
    /// Open `path`, negotiate a format and start streaming
    pub fn open(path: &Path, width: u32, height: u32) -> Result<Self, CameraError> {
        let open_err = |what: &str, e: io::Error| {
            CameraError::Open(format!("{}: {} failed: {}", path.display(), what, e))
        };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
            .map_err(|e| open_err("open", e))?;
        let fd = file.as_raw_fd();

        let mut cap: Capability = zeroed();
        xioctl(fd, VIDIOC_QUERYCAP, &mut cap).map_err(|e| open_err("VIDIOC_QUERYCAP", e))?;
        let caps = if cap.capabilities & CAP_DEVICE_CAPS != 0 {
            cap.device_caps
        } else {
            cap.capabilities
        };
        if caps & CAP_VIDEO_CAPTURE == 0 || caps & CAP_STREAMING == 0 {
            return Err(CameraError::Open(format!(
                "{} is not a streaming capture device",
                path.display()
            )));
        }

        let pix = negotiate_format(fd, width, height).map_err(|e| open_err("VIDIOC_S_FMT", e))?;
        if pix.pixelformat != PIX_FMT_MJPEG && pix.pixelformat != PIX_FMT_YUYV {
            return Err(CameraError::Open(format!(
                "{} offers neither MJPEG nor YUYV",
                path.display()
            )));
        }

        let mut request = RequestBuffers {
            count: BUFFER_COUNT,
            type_: BUF_TYPE_VIDEO_CAPTURE,
            memory: MEMORY_MMAP,
            reserved: [0; 2],
        };
        xioctl(fd, VIDIOC_REQBUFS, &mut request).map_err(|e| open_err("VIDIOC_REQBUFS", e))?;
        if request.count == 0 {
            return Err(CameraError::Open(format!("{}: no capture buffers", path.display())));
        }

        let mut buffers = Vec::with_capacity(request.count as usize);
        for index in 0..request.count {
            let mut buf = empty_buffer(index);
            xioctl(fd, VIDIOC_QUERYBUF, &mut buf).map_err(|e| open_err("VIDIOC_QUERYBUF", e))?;

            // SAFETY: offset and length come from VIDIOC_QUERYBUF for this fd
            let ptr = unsafe {
                libc::mmap(
                    ptr::null_mut(),
                    buf.length as usize,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_SHARED,
                    fd,
                    buf.m.offset as libc::off_t,
                )
            };
            if ptr == libc::MAP_FAILED {
                return Err(open_err("mmap", io::Error::last_os_error()));
            }
            buffers.push(MappedBuffer {
                ptr,
                len: buf.length as usize,
            });

            xioctl(fd, VIDIOC_QBUF, &mut buf).map_err(|e| open_err("VIDIOC_QBUF", e))?;
        }

        let mut buf_type = BUF_TYPE_VIDEO_CAPTURE as i32;
        xioctl(fd, VIDIOC_STREAMON, &mut buf_type).map_err(|e| open_err("VIDIOC_STREAMON", e))?;

        info!(
            "Streaming {} at {}x{} ({})",
            path.display(),
            pix.width,
            pix.height,
            if pix.pixelformat == PIX_FMT_MJPEG { "MJPEG" } else { "YUYV" }
        );

        Ok(Self {
            path: path.to_path_buf(),
            file,
            buffers,
            width: pix.width,
            height: pix.height,
            pixelformat: pix.pixelformat,
            sequence: 0,
            opened_at: Instant::now(),
        })
    }

    fn wait_readable(&self) -> Result<(), CameraError> {
        let mut pfd = libc::pollfd {
            fd: self.file.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        // SAFETY: a single valid pollfd
        let ret = unsafe { libc::poll(&mut pfd, 1, POLL_TIMEOUT_MS) };
        match ret {
            0 => Err(CameraError::Timeout),
            n if n < 0 => {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    Err(CameraError::Timeout)
                } else {
                    Err(CameraError::Disconnected(err.to_string()))
                }
            }
            _ if pfd.revents & (libc::POLLERR | libc::POLLHUP) != 0 => Err(
                CameraError::Disconnected(format!("{} hung up", self.path.display())),
            ),
            _ => Ok(()),
        }
    }

    fn decode(&self, data: &[u8]) -> Result<VideoFrame, CameraError> {
        let timestamp_ns = self.opened_at.elapsed().as_nanos() as u64;
        if self.pixelformat == PIX_FMT_MJPEG {
            let image = image::load_from_memory_with_format(data, ImageFormat::Jpeg)
                .map_err(|e| CameraError::Format(format!("corrupt MJPEG frame: {}", e)))?;
            Ok(VideoFrame::from_image(image.to_rgb8(), timestamp_ns, self.sequence))
        } else {
            let rgb = yuyv_to_rgb(data, self.width, self.height)?;
            VideoFrame::new(rgb, self.width, self.height, timestamp_ns, self.sequence)
        }
    }
}

impl FrameSource for DeviceSource {
    fn read_frame(&mut self) -> Result<VideoFrame, CameraError> {
        self.wait_readable()?;

        let fd = self.file.as_raw_fd();
        let mut buf = empty_buffer(0);
        if let Err(e) = xioctl(fd, VIDIOC_DQBUF, &mut buf) {
            return match e.kind() {
                io::ErrorKind::WouldBlock => Err(CameraError::Timeout),
                _ if e.raw_os_error() == Some(libc::ENODEV) => {
                    Err(CameraError::Disconnected(e.to_string()))
                }
                _ => Err(CameraError::Stream(format!("VIDIOC_DQBUF failed: {}", e))),
            };
        }

        let decoded = match self.buffers.get(buf.index as usize) {
            Some(mapped) => {
                let used = (buf.bytesused as usize).min(mapped.len);
                // SAFETY: the buffer is dequeued, so the driver is not writing it
                let data = unsafe { std::slice::from_raw_parts(mapped.ptr as *const u8, used) };
                self.decode(data)
            }
            None => Err(CameraError::Stream(format!("unknown buffer index {}", buf.index))),
        };

        if let Err(e) = xioctl(fd, VIDIOC_QBUF, &mut buf) {
            warn!("Failed to requeue buffer {}: {}", buf.index, e);
        }

        self.sequence = self.sequence.wrapping_add(1);
        decoded
    }

    fn describe(&self) -> String {
        format!("webcam {} ({}x{})", self.path.display(), self.width, self.height)
    }
}

impl Drop for DeviceSource {
    fn drop(&mut self) {
        let mut buf_type = BUF_TYPE_VIDEO_CAPTURE as i32;
        if let Err(e) = xioctl(self.file.as_raw_fd(), VIDIOC_STREAMOFF, &mut buf_type) {
            debug!("VIDIOC_STREAMOFF on {} failed: {}", self.path.display(), e);
        }
        // Buffers unmap before the file closes
        self.buffers.clear();
    }
}

fn empty_buffer(index: u32) -> Buffer {
    let mut buf: Buffer = zeroed();
    buf.index = index;
    buf.type_ = BUF_TYPE_VIDEO_CAPTURE;
    buf.memory = MEMORY_MMAP;
    buf
}

fn negotiate_format(fd: RawFd, width: u32, height: u32) -> io::Result<PixFormat> {
    let mut last = None;
    for pixelformat in [PIX_FMT_MJPEG, PIX_FMT_YUYV] {
        let mut format: Format = zeroed();
        format.type_ = BUF_TYPE_VIDEO_CAPTURE;
        let mut pix: PixFormat = zeroed();
        pix.width = width;
        pix.height = height;
        pix.pixelformat = pixelformat;
        pix.field = FIELD_NONE;
        format.fmt.pix = pix;

        xioctl(fd, VIDIOC_S_FMT, &mut format)?;
        // SAFETY: VIDIOC_S_FMT on a capture type fills the `pix` member
        let granted = unsafe { format.fmt.pix };
        if granted.pixelformat == pixelformat {
            return Ok(granted);
        }
        last = Some(granted);
    }
    last.ok_or_else(|| io::Error::new(io::ErrorKind::Unsupported, "no format"))
}

/// Convert packed YUYV 4:2:2 to RGB8 (BT.601, limited range)
pub fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>, CameraError> {
    let pixels = width as usize * height as usize;
    if width % 2 != 0 || data.len() < pixels * 2 {
        return Err(CameraError::Format(format!(
            "short YUYV frame: {} bytes for {}x{}",
            data.len(),
            width,
            height
        )));
    }

    let mut rgb = Vec::with_capacity(pixels * 3);
    for chunk in data[..pixels * 2].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&ycbcr_to_rgb(y0, u, v));
        rgb.extend_from_slice(&ycbcr_to_rgb(y1, u, v));
    }
    Ok(rgb)
}

fn ycbcr_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = (y as i32 - 16) * 298;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let clamp = |x: i32| ((x + 128) >> 8).clamp(0, 255) as u8;
    [
        clamp(c + 409 * e),
        clamp(c - 100 * d - 208 * e),
        clamp(c + 516 * d),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_struct_layouts_match_kernel_abi() {
        assert_eq!(mem::size_of::<Capability>(), 104);
        assert_eq!(mem::size_of::<PixFormat>(), 48);
        assert_eq!(mem::size_of::<RequestBuffers>(), 20);
        #[cfg(target_pointer_width = "64")]
        {
            assert_eq!(mem::size_of::<Format>(), 208);
            assert_eq!(mem::size_of::<Buffer>(), 88);
            assert_eq!(VIDIOC_DQBUF, 0xC058_5611);
        }
        assert_eq!(VIDIOC_STREAMON, 0x4004_5612);
        assert_eq!(VIDIOC_QUERYCAP, 0x8068_5600);
    }

    #[test]
    fn test_missing_device_is_open_error() {
        let result = DeviceSource::open(Path::new("/dev/no-such-video-node"), 640, 480);
        assert!(matches!(result, Err(CameraError::Open(_))));
    }

    #[test]
    fn test_regular_file_is_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let result = DeviceSource::open(file.path(), 640, 480);
        assert!(matches!(result, Err(CameraError::Open(_))));
    }

    #[test]
    fn test_yuyv_grey_and_white() {
        // Two pixels of mid grey, two of white
        let data = [128, 128, 128, 128, 235, 128, 235, 128];
        let rgb = yuyv_to_rgb(&data, 4, 1).unwrap();

        assert_eq!(rgb.len(), 12);
        assert!(rgb[..6].iter().all(|&c| (128..=131).contains(&c)));
        assert!(rgb[6..].iter().all(|&c| c == 255));
    }

    #[test]
    fn test_yuyv_short_frame_is_format_error() {
        let result = yuyv_to_rgb(&[0u8; 6], 4, 1);
        assert!(matches!(result, Err(CameraError::Format(_))));
    }
}

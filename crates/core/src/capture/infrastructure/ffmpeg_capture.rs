use crate::capture::domain::frame_source::{FrameSource, SourceInfo};
use crate::shared::frame::Frame;

use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::frame::video::Video;

/// Captures frames from anything libavformat can open: a camera device
/// (`/dev/video0` with `video4linux2`), an RTSP/HTTP URL, or a file.
///
/// Decoded frames are converted to RGB24. The scaler is rebuilt whenever
/// the decoded size or pixel format changes, which some cameras do after
/// renegotiation.
pub struct FfmpegCapture {
    source: String,
    input_format: Option<String>,
    state: Option<CaptureState>,
}

// Safety: FfmpegCapture is owned and driven by one thread at a time.
// The raw pointers inside ffmpeg types are never shared.
unsafe impl Send for FfmpegCapture {}

struct CaptureState {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: Option<RgbScaler>,
    stream_index: usize,
    next_index: u64,
    flushing: bool,
}

struct RgbScaler {
    ctx: scaling::Context,
    format: Pixel,
    width: u32,
    height: u32,
}

impl FfmpegCapture {
    /// `input_format` names an ffmpeg input device (e.g. `video4linux2`,
    /// `avfoundation`, `dshow`); `None` lets libavformat probe the source.
    pub fn new(source: impl Into<String>, input_format: Option<String>) -> Self {
        Self {
            source: source.into(),
            input_format,
            state: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }
}

impl FrameSource for FfmpegCapture {
    fn open(&mut self) -> Result<SourceInfo, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;

        let ictx = open_input(&self.source, self.input_format.as_deref())?;
        let (info, stream_index, decoder) = {
            let stream = ictx
                .streams()
                .best(ffmpeg_next::media::Type::Video)
                .ok_or("No video stream found")?;
            let codec_ctx =
                ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
            let decoder = codec_ctx.decoder().video()?;

            let rate = stream.avg_frame_rate();
            let fps = if rate.denominator() != 0 {
                rate.numerator() as f64 / rate.denominator() as f64
            } else {
                0.0
            };
            let info = SourceInfo {
                width: decoder.width(),
                height: decoder.height(),
                fps,
                codec: decoder
                    .codec()
                    .map(|c| c.name().to_string())
                    .unwrap_or_default(),
                source: self.source.clone(),
            };
            (info, stream.index(), decoder)
        };

        self.state = Some(CaptureState {
            ictx,
            decoder,
            scaler: None,
            stream_index,
            next_index: 0,
            flushing: false,
        });
        Ok(info)
    }

    fn read(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        let state = self.state.as_mut().ok_or("FfmpegCapture: not opened")?;
        state.next_frame()
    }
}

impl CaptureState {
    fn next_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        loop {
            if let Some(frame) = self.receive()? {
                return Ok(Some(frame));
            }
            if self.flushing {
                return Ok(None);
            }

            match self.ictx.packets().next() {
                Some((stream, packet)) => {
                    if stream.index() != self.stream_index {
                        continue;
                    }
                    // A corrupt packet costs one frame, not the stream.
                    if let Err(e) = self.decoder.send_packet(&packet) {
                        log::debug!("Dropping undecodable packet: {e}");
                    }
                }
                None => {
                    let _ = self.decoder.send_eof();
                    self.flushing = true;
                }
            }
        }
    }

    fn receive(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        let mut decoded = Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }

        let (format, width, height) = (decoded.format(), decoded.width(), decoded.height());
        let stale = self
            .scaler
            .as_ref()
            .map_or(true, |s| (s.format, s.width, s.height) != (format, width, height));
        if stale {
            self.scaler = Some(RgbScaler {
                ctx: scaling::Context::get(
                    format,
                    width,
                    height,
                    Pixel::RGB24,
                    width,
                    height,
                    scaling::Flags::BILINEAR,
                )?,
                format,
                width,
                height,
            });
        }
        let Some(scaler) = self.scaler.as_mut() else {
            return Ok(None);
        };

        let mut rgb = Video::empty();
        scaler.ctx.run(&decoded, &mut rgb)?;

        let frame = Frame::from_rgb(
            extract_rgb_pixels(&rgb, width, height),
            width,
            height,
            self.next_index,
        )?;
        self.next_index += 1;
        Ok(Some(frame))
    }
}

fn open_input(
    source: &str,
    input_format: Option<&str>,
) -> Result<ffmpeg_next::format::context::Input, Box<dyn std::error::Error>> {
    let options = input_options(source);
    match input_format {
        None => Ok(ffmpeg_next::format::input_with_dictionary(&source, options)?),
        Some(name) => {
            ffmpeg_next::device::register_all();
            let format = ffmpeg_next::device::input::video()
                .find(|f| f.name() == name)
                .ok_or_else(|| format!("Unknown input device format '{name}'"))?;
            Ok(ffmpeg_next::format::open_with(&source, &format, options)?.input())
        }
    }
}

/// Demuxer options for a source. RTSP goes over TCP, UDP loses too many
/// packets on congested links.
fn input_options(source: &str) -> ffmpeg_next::Dictionary<'static> {
    let mut options = ffmpeg_next::Dictionary::new();
    if source.starts_with("rtsp://") {
        options.set("rtsp_transport", "tcp");
    }
    options
}

/// Copies an RGB24 ffmpeg frame into a tightly packed buffer, dropping any
/// per-row stride padding.
fn extract_rgb_pixels(rgb: &Video, width: u32, height: u32) -> Vec<u8> {
    let stride = rgb.stride(0);
    let data = rgb.data(0);
    let row_bytes = width as usize * 3;

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(&data[start..start + row_bytes]);
    }
    pixels
}

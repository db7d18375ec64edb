use crate::models::{SampleFormat, StreamParams};

/// Destination buffer handed to a data callback.
///
/// Holds exactly `frames()` frames of interleaved samples in the stream's
/// encoding. The callback owns it for the duration of the call.
pub struct OutputBuffer<'a> {
    data: &'a mut [u8],
    frames: usize,
    channels: u16,
    format: SampleFormat,
}

impl<'a> OutputBuffer<'a> {
    /// Wrap `data`; any trailing bytes that do not form a whole frame are ignored
    pub fn new(data: &'a mut [u8], params: &StreamParams) -> Self {
        let frame_bytes = params.frame_bytes().max(1);
        let frames = data.len() / frame_bytes;
        let data = &mut data[..frames * frame_bytes];
        Self {
            data,
            frames,
            channels: params.channels,
            format: params.format,
        }
    }

    /// Number of frames requested by the backend
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    pub fn frame_bytes(&self) -> usize {
        self.format.bytes_per_sample() * self.channels as usize
    }

    /// Raw little endian bytes, `frames() * frame_bytes()` long
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.data
    }

    pub fn fill_silence(&mut self) {
        fill_silence(self.data, self.format);
    }

    fn offset(&self, frame: usize, channel: u16) -> usize {
        assert!(
            frame < self.frames && channel < self.channels,
            "sample ({}, {}) out of range for {} frames x {} channels",
            frame, channel, self.frames, self.channels
        );
        (frame * self.channels as usize + channel as usize) * self.format.bytes_per_sample()
    }

    pub fn write_u8(&mut self, frame: usize, channel: u16, value: u8) {
        debug_assert_eq!(self.format, SampleFormat::U8);
        let at = self.offset(frame, channel);
        self.data[at] = value;
    }

    pub fn write_i16(&mut self, frame: usize, channel: u16, value: i16) {
        debug_assert_eq!(self.format, SampleFormat::S16LE);
        let at = self.offset(frame, channel);
        self.data[at..at + 2].copy_from_slice(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, frame: usize, channel: u16, value: f32) {
        debug_assert_eq!(self.format, SampleFormat::F32LE);
        let at = self.offset(frame, channel);
        self.data[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Write a normalized [-1.0, 1.0] sample in whatever encoding the stream uses
    pub fn write_normalized(&mut self, frame: usize, channel: u16, value: f32) {
        let value = value.clamp(-1.0, 1.0);
        match self.format {
            SampleFormat::U8 => self.write_u8(frame, channel, (value * 127.0 + 128.0).round() as u8),
            SampleFormat::S16LE => self.write_i16(frame, channel, (value * i16::MAX as f32).round() as i16),
            SampleFormat::F32LE => self.write_f32(frame, channel, value),
        }
    }
}

/// Fill `data` with the encoding's silence value
pub fn fill_silence(data: &mut [u8], format: SampleFormat) {
    data.fill(format.silence_byte());
}

/// Scale every sample in `data` by `volume`.
///
/// U8 is scaled around its 128 midpoint, S16LE saturates, F32LE is a plain
/// multiply. A volume of exactly 1.0 leaves the buffer untouched.
pub fn apply_volume(data: &mut [u8], format: SampleFormat, volume: f32) {
    if volume == 1.0 {
        return;
    }

    match format {
        SampleFormat::U8 => {
            for sample in data.iter_mut() {
                let centered = *sample as f32 - 128.0;
                *sample = (centered * volume + 128.0).round().clamp(0.0, 255.0) as u8;
            }
        }
        SampleFormat::S16LE => {
            for chunk in data.chunks_exact_mut(2) {
                let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
                let scaled = (sample as f32 * volume).round() as i16; // `as` saturates
                chunk.copy_from_slice(&scaled.to_le_bytes());
            }
        }
        SampleFormat::F32LE => {
            for chunk in data.chunks_exact_mut(4) {
                let sample = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                chunk.copy_from_slice(&(sample * volume).to_le_bytes());
            }
        }
    }
}

/// Device sample types a typed backend buffer can hold
pub trait PcmSample: Copy + Send + 'static {
    const FORMAT: SampleFormat;

    /// Decode one sample from its little endian bytes
    fn from_le_slice(bytes: &[u8]) -> Self;
}

impl PcmSample for u8 {
    const FORMAT: SampleFormat = SampleFormat::U8;

    fn from_le_slice(bytes: &[u8]) -> Self {
        bytes[0]
    }
}

impl PcmSample for i16 {
    const FORMAT: SampleFormat = SampleFormat::S16LE;

    fn from_le_slice(bytes: &[u8]) -> Self {
        i16::from_le_bytes([bytes[0], bytes[1]])
    }
}

impl PcmSample for f32 {
    const FORMAT: SampleFormat = SampleFormat::F32LE;

    fn from_le_slice(bytes: &[u8]) -> Self {
        f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

/// Byte staging area between a typed device buffer and the byte-level pump.
///
/// Preallocated to the stream latency so the render thread only allocates
/// when a backend asks for a larger buffer than was requested.
#[derive(Debug)]
pub struct ShadowBuffer {
    bytes: Vec<u8>,
    format: SampleFormat,
}

impl ShadowBuffer {
    pub fn with_capacity_frames(params: &StreamParams, frames: usize) -> Self {
        Self {
            bytes: vec![params.format.silence_byte(); frames * params.frame_bytes()],
            format: params.format,
        }
    }

    pub fn capacity_bytes(&self) -> usize {
        self.bytes.len()
    }

    /// Staging slice for `len` bytes, growing the buffer if needed
    pub fn staging(&mut self, len: usize) -> &mut [u8] {
        if self.bytes.len() < len {
            self.bytes.resize(len, self.format.silence_byte());
        }
        &mut self.bytes[..len]
    }

    /// Copy the first `out.len()` staged samples into a typed device buffer
    pub fn copy_to<T: PcmSample>(&self, out: &mut [T]) {
        debug_assert_eq!(T::FORMAT, self.format);
        let width = T::FORMAT.bytes_per_sample();
        for (sample, bytes) in out.iter_mut().zip(self.bytes.chunks_exact(width)) {
            *sample = T::from_le_slice(bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(format: SampleFormat, channels: u16) -> StreamParams {
        StreamParams::new(format, 48000, channels)
    }

    #[test]
    fn test_output_buffer_geometry() {
        let mut data = vec![0u8; 4 * 10 + 3];
        let buffer = OutputBuffer::new(&mut data, &params(SampleFormat::S16LE, 2));
        assert_eq!(buffer.frames(), 10);
        assert_eq!(buffer.channels(), 2);
        assert_eq!(buffer.frame_bytes(), 4);
    }

    #[test]
    fn test_typed_writes_are_little_endian() {
        let mut data = vec![0u8; 8];
        {
            let mut buffer = OutputBuffer::new(&mut data, &params(SampleFormat::S16LE, 2));
            buffer.write_i16(0, 0, 0x1234);
            buffer.write_i16(1, 1, -2);
        }
        assert_eq!(&data[0..2], &[0x34, 0x12]);
        assert_eq!(&data[6..8], &(-2i16).to_le_bytes());

        let mut data = vec![0u8; 4];
        OutputBuffer::new(&mut data, &params(SampleFormat::F32LE, 1)).write_f32(0, 0, 0.5);
        assert_eq!(f32::from_le_bytes([data[0], data[1], data[2], data[3]]), 0.5);
    }

    #[test]
    fn test_write_normalized_per_format() {
        let mut data = vec![0u8; 3];
        {
            let mut buffer = OutputBuffer::new(&mut data, &params(SampleFormat::U8, 1));
            buffer.write_normalized(0, 0, 0.0);
            buffer.write_normalized(1, 0, 1.0);
            buffer.write_normalized(2, 0, -1.0);
        }
        assert_eq!(data, vec![128, 255, 1]);

        let mut data = vec![0u8; 2];
        OutputBuffer::new(&mut data, &params(SampleFormat::S16LE, 1)).write_normalized(0, 0, 2.0);
        assert_eq!(i16::from_le_bytes([data[0], data[1]]), i16::MAX);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_write_out_of_range_panics() {
        let mut data = vec![0u8; 4];
        let mut buffer = OutputBuffer::new(&mut data, &params(SampleFormat::F32LE, 1));
        buffer.write_f32(1, 0, 0.0);
    }

    #[test]
    fn test_fill_silence() {
        let mut data = vec![7u8; 4];
        fill_silence(&mut data, SampleFormat::U8);
        assert_eq!(data, vec![0x80; 4]);

        let mut data = vec![7u8; 4];
        OutputBuffer::new(&mut data, &params(SampleFormat::S16LE, 1)).fill_silence();
        assert_eq!(data, vec![0; 4]);
    }

    #[test]
    fn test_apply_volume_f32() {
        let mut data: Vec<u8> = [1.0f32, -0.5].iter().flat_map(|s| s.to_le_bytes()).collect();
        apply_volume(&mut data, SampleFormat::F32LE, 0.5);
        let samples: Vec<f32> = data
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(samples, vec![0.5, -0.25]);
    }

    #[test]
    fn test_apply_volume_s16() {
        let mut data: Vec<u8> = [1000i16, -32768].iter().flat_map(|s| s.to_le_bytes()).collect();
        apply_volume(&mut data, SampleFormat::S16LE, 0.5);
        assert_eq!(i16::from_le_bytes([data[0], data[1]]), 500);
        assert_eq!(i16::from_le_bytes([data[2], data[3]]), -16384);
    }

    #[test]
    fn test_apply_volume_u8_scales_around_midpoint() {
        let mut data = vec![128u8, 228, 28];
        apply_volume(&mut data, SampleFormat::U8, 0.5);
        assert_eq!(data, vec![128, 178, 78]);

        let mut data = vec![255u8, 0];
        apply_volume(&mut data, SampleFormat::U8, 0.0);
        assert_eq!(data, vec![128, 128]);
    }

    #[test]
    fn test_apply_unity_volume_is_untouched() {
        let mut data = vec![1u8, 2, 3, 4];
        apply_volume(&mut data, SampleFormat::F32LE, 1.0);
        assert_eq!(data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_shadow_buffer_copies_typed_samples() {
        let p = params(SampleFormat::S16LE, 2);
        let mut shadow = ShadowBuffer::with_capacity_frames(&p, 2);
        assert_eq!(shadow.capacity_bytes(), 8);

        let staging = shadow.staging(8);
        staging[..2].copy_from_slice(&300i16.to_le_bytes());
        staging[2..4].copy_from_slice(&(-300i16).to_le_bytes());

        let mut out = [0i16; 4];
        shadow.copy_to(&mut out);
        assert_eq!(out, [300, -300, 0, 0]);
    }

    #[test]
    fn test_shadow_buffer_grows_on_demand() {
        let p = params(SampleFormat::U8, 1);
        let mut shadow = ShadowBuffer::with_capacity_frames(&p, 4);
        assert_eq!(shadow.staging(16).len(), 16);
        assert_eq!(shadow.capacity_bytes(), 16);
        assert!(shadow.staging(16).iter().all(|b| *b == 0x80));
    }
}

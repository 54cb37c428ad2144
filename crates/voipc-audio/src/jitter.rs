//! Audio jitter buffer: a fixed-size ring of interleaved PCM samples sitting
//! between the audio decoder worker (producer) and the playback callback
//! (consumer), absorbing arrival jitter so playback never stalls on a single
//! late packet.
//!
//! State machine: `Buffering` ⇄ `Playing`. While buffering, the consumer
//! reads only silence; once enough samples have accumulated, playback
//! starts and continues until the buffer runs dry, at which point it falls
//! back to buffering rather than glitching on every individual gap.

/// One second of audio at 48kHz stereo, generous headroom over the
/// ~100ms target latency so bursts don't force an early underrun.
const RING_CAPACITY_SAMPLES: usize = 48_000 * 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Buffering,
    Playing,
}

pub struct JitterBuffer {
    ring: Vec<f32>,
    write_pos: usize,
    read_pos: usize,
    available: usize,
    state: State,
    target_latency: usize,
}

impl JitterBuffer {
    /// `sample_rate` and `channels` determine `target_latency = SR/10 *
    /// channels` (≈100ms). At 48kHz stereo that's 9600 samples.
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        let target_latency = (sample_rate as usize / 10) * channels;
        Self {
            ring: vec![0.0; RING_CAPACITY_SAMPLES],
            write_pos: 0,
            read_pos: 0,
            available: 0,
            state: State::Buffering,
            target_latency,
        }
    }

    pub fn target_latency(&self) -> usize {
        self.target_latency
    }

    pub fn is_buffering(&self) -> bool {
        self.state == State::Buffering
    }

    pub fn available(&self) -> usize {
        self.available
    }

    /// Write decoded PCM samples into the ring. Samples beyond the ring's
    /// free space are dropped, not the oldest unread samples — playback must
    /// never see a torn frame, so the producer eats the overflow instead of
    /// clobbering what the consumer hasn't read yet.
    pub fn write(&mut self, samples: &[f32]) {
        let capacity = self.ring.len();
        let to_write = samples.len().min(capacity - self.available);
        for &sample in &samples[..to_write] {
            self.ring[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % capacity;
        }
        self.available += to_write;

        if self.state == State::Buffering && self.available >= self.target_latency {
            self.state = State::Playing;
        }
    }

    /// Fill `out` with exactly `out.len()` samples: playback audio while
    /// `Playing` and samples remain, silence otherwise. On draining the
    /// buffer completely this call transitions back to `Buffering`.
    pub fn read(&mut self, out: &mut [f32]) {
        if self.state == State::Buffering {
            out.fill(0.0);
            return;
        }

        let capacity = self.ring.len();
        let to_read = out.len().min(self.available);
        for slot in out.iter_mut().take(to_read) {
            *slot = self.ring[self.read_pos];
            self.read_pos = (self.read_pos + 1) % capacity;
        }
        for slot in out.iter_mut().skip(to_read) {
            *slot = 0.0;
        }
        self.available -= to_read;

        if self.available == 0 {
            self.state = State::Buffering;
        }
    }

    /// Discard all buffered audio and return to the initial buffering state,
    /// e.g. on a stream timeout reset.
    pub fn reset(&mut self) {
        self.write_pos = 0;
        self.read_pos = 0;
        self.available = 0;
        self.state = State::Buffering;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_buffering_and_emits_silence() {
        let mut jb = JitterBuffer::new(48_000, 2);
        assert!(jb.is_buffering());
        let mut out = vec![1.0f32; 128];
        jb.read(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn transitions_to_playing_once_target_latency_reached() {
        let mut jb = JitterBuffer::new(48_000, 2);
        assert_eq!(jb.target_latency(), 9600);
        jb.write(&vec![0.5f32; 4800]);
        assert!(jb.is_buffering());
        jb.write(&vec![0.5f32; 4800]);
        assert!(!jb.is_buffering());
    }

    #[test]
    fn playing_drains_samples_in_fifo_order() {
        let mut jb = JitterBuffer::new(48_000, 2);
        let first_burst: Vec<f32> = (0..9600).map(|i| i as f32).collect();
        jb.write(&first_burst);
        assert!(!jb.is_buffering());

        let mut out = vec![0.0f32; 2048];
        jb.read(&mut out);
        assert_eq!(out, first_burst[..2048]);
    }

    #[test]
    fn underrun_returns_to_buffering_and_pads_with_silence() {
        let mut jb = JitterBuffer::new(48_000, 2);
        jb.write(&vec![1.0f32; 9600]);
        let mut out = vec![0.0f32; 20_000];
        jb.read(&mut out);
        // Only 9600 real samples existed; the rest must be silence, and the
        // buffer must have fallen back to Buffering.
        assert!(out[9600..].iter().all(|&s| s == 0.0));
        assert!(jb.is_buffering());
        assert_eq!(jb.available(), 0);
    }

    #[test]
    fn jitter_buffer_startup_scenario() {
        // Producer writes 4800 samples into an empty buffer (target=9600);
        // consumer requests 2048 samples — all zeros, still buffering.
        let mut jb = JitterBuffer::new(48_000, 2);
        jb.write(&vec![1.0f32; 4800]);
        let mut out = vec![9.0f32; 2048];
        jb.read(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));

        // Producer writes 9600 more; next consumer request returns producer
        // data in order.
        let second_burst: Vec<f32> = (0..9600).map(|i| i as f32 + 100.0).collect();
        jb.write(&second_burst);
        assert!(!jb.is_buffering());
        let mut out2 = vec![0.0f32; 100];
        jb.read(&mut out2);
        assert_eq!(out2, second_burst[..100]);
    }

    #[test]
    fn reset_returns_to_initial_state() {
        let mut jb = JitterBuffer::new(48_000, 2);
        jb.write(&vec![1.0f32; 9600]);
        assert!(!jb.is_buffering());
        jb.reset();
        assert!(jb.is_buffering());
        assert_eq!(jb.available(), 0);
    }

    #[test]
    fn writes_past_capacity_are_capped() {
        let mut jb = JitterBuffer::new(48_000, 2);
        jb.write(&vec![1.0f32; RING_CAPACITY_SAMPLES + 1000]);
        assert_eq!(jb.available(), RING_CAPACITY_SAMPLES);
    }

    #[test]
    fn overflow_drops_excess_instead_of_clobbering_unread_samples() {
        // Fill to within 100 samples of capacity with a known pattern, then
        // try to write 1000 more: only the 100 that fit should be accepted,
        // and every previously-written, not-yet-read sample must survive
        // untouched rather than being overwritten by the excess.
        let mut jb = JitterBuffer::new(48_000, 2);
        let first: Vec<f32> = (0..RING_CAPACITY_SAMPLES - 100).map(|i| i as f32).collect();
        jb.write(&first);
        assert_eq!(jb.available(), first.len());

        let second = vec![9999.0f32; 1000];
        jb.write(&second);
        assert_eq!(jb.available(), RING_CAPACITY_SAMPLES);

        let mut out = vec![0.0f32; RING_CAPACITY_SAMPLES];
        jb.read(&mut out);
        assert_eq!(&out[..first.len()], &first[..], "unread samples were clobbered by overflow");
        assert_eq!(&out[first.len()..], &vec![9999.0f32; 100][..]);
    }
}

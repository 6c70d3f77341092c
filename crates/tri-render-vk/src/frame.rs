// SPDX-License-Identifier: CEPL-1.0
//! Frame pacing: the fence / acquire / record / submit / present cycle over
//! a fixed ring of frame slots, independent of the Vulkan objects behind it.

use tracing::{debug, trace};
use tri_render::FrameOutcome;

use crate::error::RenderResult;

/// Lifecycle of one frame slot within a single `draw_frame` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Waiting,
    Acquiring,
    Recording,
    Submitted,
    Presenting,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FenceWait {
    Signaled,
    TimedOut,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired { image_index: u32, suboptimal: bool },
    /// The swapchain no longer matches the surface; nothing was acquired.
    Stale,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    Stale,
}

/// GPU-side operations the executor sequences. Anything other than the
/// outcomes above comes back as an error and ends the frame.
pub trait FrameBackend {
    fn wait_for_fence(&mut self, slot: usize, timeout_ns: u64) -> RenderResult<FenceWait>;
    fn acquire_next_image(&mut self, slot: usize) -> RenderResult<AcquireOutcome>;
    fn reset_fence(&mut self, slot: usize) -> RenderResult<()>;
    fn record_commands(&mut self, slot: usize, image_index: u32) -> RenderResult<()>;
    /// Waits on the slot's image-available semaphore, signals its
    /// render-finished semaphore and its fence.
    fn submit(&mut self, slot: usize) -> RenderResult<()>;
    fn present(&mut self, slot: usize, image_index: u32) -> RenderResult<PresentOutcome>;
    /// May leave the old swapchain in place when the surface is 0x0; see
    /// [`FrameBackend::recreate_deferred`].
    fn recreate_swapchain(&mut self) -> RenderResult<()>;
    /// A rebuild was asked for while the surface had nothing to build into.
    fn recreate_deferred(&self) -> bool;
}

#[derive(Debug)]
pub struct FrameExecutor {
    frames_in_flight: usize,
    current_frame: usize,
    slots: Vec<SlotState>,
    resize_pending: bool,
    recreations: u64,
}

impl FrameExecutor {
    pub fn new(frames_in_flight: usize) -> Self {
        let n = frames_in_flight.max(1);
        Self {
            frames_in_flight: n,
            current_frame: 0,
            slots: vec![SlotState::Idle; n],
            resize_pending: false,
            recreations: 0,
        }
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn slot_state(&self, slot: usize) -> SlotState {
        self.slots[slot]
    }

    pub fn recreations(&self) -> u64 {
        self.recreations
    }

    /// Forces a swapchain rebuild after the next present.
    pub fn request_recreate(&mut self) {
        self.resize_pending = true;
    }

    pub fn recreate_pending(&self) -> bool {
        self.resize_pending
    }

    fn recreate<B: FrameBackend>(&mut self, backend: &mut B) -> RenderResult<()> {
        self.resize_pending = false;
        self.recreations += 1;
        backend.recreate_swapchain()
    }

    /// Entry point per redraw. Nothing is touched while `paused`. A deferred
    /// rebuild is retried first and the frame is skipped if it still cannot
    /// run; once it has, any rebuild requested meanwhile is already covered.
    pub fn render<B: FrameBackend>(
        &mut self,
        backend: &mut B,
        paused: bool,
    ) -> RenderResult<FrameOutcome> {
        if paused {
            return Ok(FrameOutcome::Skipped);
        }
        if backend.recreate_deferred() {
            self.recreate(backend)?;
            if backend.recreate_deferred() {
                return Ok(FrameOutcome::Skipped);
            }
        }
        self.draw_frame(backend)
    }

    // STRICT PER-FRAME ORDER:
    // 1) wait slot fence      2) acquire (signals image-available)
    // 3) reset slot fence     4) record slot command buffer
    // 5) submit               6) present (waits render-finished)
    // 7) advance current_frame
    // Resetting the fence before a successful acquire would leave it unsignaled
    // with nothing submitted, and the next wait on this slot would never return.
    pub fn draw_frame<B: FrameBackend>(&mut self, backend: &mut B) -> RenderResult<FrameOutcome> {
        let slot = self.current_frame % self.frames_in_flight;

        self.slots[slot] = SlotState::Waiting;
        loop {
            match backend.wait_for_fence(slot, u64::MAX)? {
                FenceWait::Signaled => break,
                FenceWait::TimedOut => trace!("slot {slot}: fence wait timed out, retrying"),
            }
        }

        self.slots[slot] = SlotState::Acquiring;
        let (image_index, acquire_suboptimal) = match backend.acquire_next_image(slot)? {
            AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            } => (image_index, suboptimal),
            AcquireOutcome::Stale => {
                debug!("acquire: swapchain out of date, recreating");
                self.slots[slot] = SlotState::Idle;
                self.recreate(backend)?;
                return Ok(FrameOutcome::SwapchainRecreated);
            }
        };

        backend.reset_fence(slot)?;

        self.slots[slot] = SlotState::Recording;
        backend.record_commands(slot, image_index)?;

        backend.submit(slot)?;
        self.slots[slot] = SlotState::Submitted;

        self.slots[slot] = SlotState::Presenting;
        let presented = backend.present(slot, image_index)?;
        self.slots[slot] = SlotState::Idle;

        self.current_frame = self.current_frame.wrapping_add(1);

        let needs_recreate = acquire_suboptimal
            || self.resize_pending
            || matches!(presented, PresentOutcome::Stale | PresentOutcome::Suboptimal);
        if needs_recreate {
            debug!(
                "present: {:?} (acquire suboptimal={}, resize pending={}), recreating",
                presented, acquire_suboptimal, self.resize_pending
            );
            self.recreate(backend)?;
            return Ok(FrameOutcome::SwapchainRecreated);
        }
        Ok(FrameOutcome::Presented)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use ash::vk;
    use std::collections::VecDeque;

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Call {
        Wait(usize),
        Acquire(usize),
        Reset(usize),
        Record(usize, u32),
        Submit(usize),
        Present(usize, u32),
        Recreate,
    }

    /// Simulated queue: a submission runs until someone waits on its fence.
    struct MockBackend {
        images: u32,
        next_image: u32,
        fence_signaled: Vec<bool>,
        executing: Vec<bool>,
        acquire_script: VecDeque<AcquireOutcome>,
        present_script: VecDeque<PresentOutcome>,
        timeouts_left: usize,
        fail_submit: bool,
        /// Minimized: the surface reports a 0x0 extent.
        surface_empty: bool,
        deferred: bool,
        calls: Vec<Call>,
    }

    impl MockBackend {
        fn new(frames: usize, images: u32) -> Self {
            Self {
                images,
                next_image: 0,
                fence_signaled: vec![true; frames],
                executing: vec![false; frames],
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
                timeouts_left: 0,
                fail_submit: false,
                surface_empty: false,
                deferred: false,
                calls: Vec::new(),
            }
        }

        fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
            self.calls.iter().filter(|c| pred(c)).count()
        }
    }

    impl FrameBackend for MockBackend {
        fn wait_for_fence(&mut self, slot: usize, _timeout_ns: u64) -> RenderResult<FenceWait> {
            self.calls.push(Call::Wait(slot));
            if self.timeouts_left > 0 {
                self.timeouts_left -= 1;
                return Ok(FenceWait::TimedOut);
            }
            if self.executing[slot] {
                self.executing[slot] = false;
                self.fence_signaled[slot] = true;
            }
            if !self.fence_signaled[slot] {
                // Nothing will ever signal this fence.
                return Err(RenderError::UnexpectedResult {
                    op: "wait_for_fences (deadlock)",
                    result: vk::Result::TIMEOUT,
                });
            }
            Ok(FenceWait::Signaled)
        }

        fn acquire_next_image(&mut self, slot: usize) -> RenderResult<AcquireOutcome> {
            self.calls.push(Call::Acquire(slot));
            if let Some(scripted) = self.acquire_script.pop_front() {
                return Ok(scripted);
            }
            let image_index = self.next_image;
            self.next_image = (self.next_image + 1) % self.images;
            Ok(AcquireOutcome::Acquired {
                image_index,
                suboptimal: false,
            })
        }

        fn reset_fence(&mut self, slot: usize) -> RenderResult<()> {
            self.calls.push(Call::Reset(slot));
            assert!(!self.executing[slot], "reset of a fence still in use");
            self.fence_signaled[slot] = false;
            Ok(())
        }

        fn record_commands(&mut self, slot: usize, image_index: u32) -> RenderResult<()> {
            self.calls.push(Call::Record(slot, image_index));
            assert!(
                !self.executing[slot],
                "slot {slot} re-recorded before its fence signaled"
            );
            Ok(())
        }

        fn submit(&mut self, slot: usize) -> RenderResult<()> {
            self.calls.push(Call::Submit(slot));
            if self.fail_submit {
                return Err(RenderError::Vulkan {
                    op: "queue_submit",
                    result: vk::Result::ERROR_DEVICE_LOST,
                });
            }
            self.executing[slot] = true;
            Ok(())
        }

        fn present(&mut self, slot: usize, image_index: u32) -> RenderResult<PresentOutcome> {
            self.calls.push(Call::Present(slot, image_index));
            Ok(self
                .present_script
                .pop_front()
                .unwrap_or(PresentOutcome::Presented))
        }

        fn recreate_swapchain(&mut self) -> RenderResult<()> {
            self.calls.push(Call::Recreate);
            self.deferred = self.surface_empty;
            Ok(())
        }

        fn recreate_deferred(&self) -> bool {
            self.deferred
        }
    }

    #[test]
    fn many_frames_never_deadlock_or_reuse_busy_slot() {
        for frames in 1..=3 {
            let mut exec = FrameExecutor::new(frames);
            let mut gpu = MockBackend::new(frames, 3);
            let n = frames * 5 + 1;
            for _ in 0..n {
                assert_eq!(exec.draw_frame(&mut gpu).unwrap(), FrameOutcome::Presented);
            }
            assert_eq!(exec.current_frame(), n);
            assert_eq!(gpu.count(|c| matches!(c, Call::Submit(_))), n);
            assert_eq!(gpu.count(|c| matches!(c, Call::Recreate)), 0);
        }
    }

    #[test]
    fn slots_rotate_in_order() {
        let mut exec = FrameExecutor::new(2);
        let mut gpu = MockBackend::new(2, 3);
        for _ in 0..4 {
            exec.draw_frame(&mut gpu).unwrap();
        }
        let submits: Vec<_> = gpu
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Submit(s) => Some(*s),
                _ => None,
            })
            .collect();
        assert_eq!(submits, vec![0, 1, 0, 1]);
    }

    #[test]
    fn per_frame_call_order() {
        let mut exec = FrameExecutor::new(2);
        let mut gpu = MockBackend::new(2, 3);
        exec.draw_frame(&mut gpu).unwrap();
        assert_eq!(
            gpu.calls,
            vec![
                Call::Wait(0),
                Call::Acquire(0),
                Call::Reset(0),
                Call::Record(0, 0),
                Call::Submit(0),
                Call::Present(0, 0),
            ]
        );
        assert_eq!(exec.slot_state(0), SlotState::Idle);
    }

    #[test]
    fn stale_acquire_recreates_once_without_reset_or_advance() {
        let mut exec = FrameExecutor::new(2);
        let mut gpu = MockBackend::new(2, 3);
        exec.draw_frame(&mut gpu).unwrap();
        gpu.calls.clear();

        gpu.acquire_script.push_back(AcquireOutcome::Stale);
        let before = exec.current_frame();
        assert_eq!(
            exec.draw_frame(&mut gpu).unwrap(),
            FrameOutcome::SwapchainRecreated
        );
        assert_eq!(exec.current_frame(), before);
        assert_eq!(exec.recreations(), 1);
        assert_eq!(gpu.calls, vec![Call::Wait(1), Call::Acquire(1), Call::Recreate]);

        // Same slot is retried and its fence is still signaled.
        gpu.calls.clear();
        assert_eq!(exec.draw_frame(&mut gpu).unwrap(), FrameOutcome::Presented);
        assert_eq!(gpu.calls[0], Call::Wait(1));
        assert_eq!(exec.current_frame(), before + 1);
    }

    #[test]
    fn suboptimal_acquire_still_presents_then_recreates() {
        let mut exec = FrameExecutor::new(2);
        let mut gpu = MockBackend::new(2, 3);
        gpu.acquire_script.push_back(AcquireOutcome::Acquired {
            image_index: 2,
            suboptimal: true,
        });
        assert_eq!(
            exec.draw_frame(&mut gpu).unwrap(),
            FrameOutcome::SwapchainRecreated
        );
        assert!(gpu.calls.contains(&Call::Present(0, 2)));
        assert_eq!(gpu.calls.last(), Some(&Call::Recreate));
        assert_eq!(exec.current_frame(), 1);
    }

    #[test]
    fn stale_or_suboptimal_present_recreates() {
        for outcome in [PresentOutcome::Stale, PresentOutcome::Suboptimal] {
            let mut exec = FrameExecutor::new(2);
            let mut gpu = MockBackend::new(2, 3);
            gpu.present_script.push_back(outcome);
            assert_eq!(
                exec.draw_frame(&mut gpu).unwrap(),
                FrameOutcome::SwapchainRecreated
            );
            assert_eq!(exec.recreations(), 1);
            assert_eq!(exec.current_frame(), 1);
            // The submitted work is still tracked by the fence.
            assert_eq!(exec.draw_frame(&mut gpu).unwrap(), FrameOutcome::Presented);
            assert_eq!(exec.draw_frame(&mut gpu).unwrap(), FrameOutcome::Presented);
        }
    }

    #[test]
    fn pending_resize_recreates_after_present() {
        let mut exec = FrameExecutor::new(2);
        let mut gpu = MockBackend::new(2, 3);
        exec.request_recreate();
        assert!(exec.recreate_pending());
        assert_eq!(
            exec.draw_frame(&mut gpu).unwrap(),
            FrameOutcome::SwapchainRecreated
        );
        assert!(!exec.recreate_pending());
        assert_eq!(exec.draw_frame(&mut gpu).unwrap(), FrameOutcome::Presented);
    }

    #[test]
    fn fence_timeout_is_retried() {
        let mut exec = FrameExecutor::new(1);
        let mut gpu = MockBackend::new(1, 2);
        gpu.timeouts_left = 3;
        assert_eq!(exec.draw_frame(&mut gpu).unwrap(), FrameOutcome::Presented);
        assert_eq!(gpu.count(|c| matches!(c, Call::Wait(0))), 4);
    }

    #[test]
    fn backend_errors_are_fatal() {
        let mut exec = FrameExecutor::new(2);
        let mut gpu = MockBackend::new(2, 3);
        gpu.fail_submit = true;
        let err = exec.draw_frame(&mut gpu).unwrap_err();
        assert!(matches!(
            err,
            RenderError::Vulkan {
                op: "queue_submit",
                ..
            }
        ));
        assert_eq!(exec.current_frame(), 0);
        assert!(!gpu.calls.contains(&Call::Present(0, 0)));
    }

    #[test]
    fn zero_frames_in_flight_is_clamped() {
        let exec = FrameExecutor::new(0);
        assert_eq!(exec.frames_in_flight(), 1);
    }

    #[test]
    fn paused_frames_touch_nothing() {
        let mut exec = FrameExecutor::new(2);
        let mut gpu = MockBackend::new(2, 3);
        for _ in 0..3 {
            assert_eq!(exec.render(&mut gpu, true).unwrap(), FrameOutcome::Skipped);
        }
        assert!(gpu.calls.is_empty());
        assert_eq!(exec.current_frame(), 0);
    }

    #[test]
    fn rebuild_on_empty_surface_waits_for_restore() {
        let mut exec = FrameExecutor::new(2);
        let mut gpu = MockBackend::new(2, 3);
        assert_eq!(exec.render(&mut gpu, false).unwrap(), FrameOutcome::Presented);

        // Minimized without a 0x0 resize: the next acquire goes stale and the
        // rebuild has nothing to build into.
        gpu.surface_empty = true;
        gpu.acquire_script.push_back(AcquireOutcome::Stale);
        assert_eq!(
            exec.render(&mut gpu, false).unwrap(),
            FrameOutcome::SwapchainRecreated
        );
        assert!(gpu.recreate_deferred());

        // Still minimized: retried, deferred again, nothing waited or acquired.
        gpu.calls.clear();
        assert_eq!(exec.render(&mut gpu, false).unwrap(), FrameOutcome::Skipped);
        assert_eq!(gpu.calls, vec![Call::Recreate]);

        // Restored; the resize that came with it is covered by the retried
        // rebuild, so exactly one rebuild happens before drawing resumes.
        gpu.surface_empty = false;
        exec.request_recreate();
        gpu.calls.clear();
        assert_eq!(exec.render(&mut gpu, false).unwrap(), FrameOutcome::Presented);
        assert_eq!(gpu.count(|c| *c == Call::Recreate), 1);
        assert_eq!(gpu.calls[0], Call::Recreate);
        assert!(!gpu.recreate_deferred());
        assert!(!exec.recreate_pending());

        gpu.calls.clear();
        assert_eq!(exec.render(&mut gpu, false).unwrap(), FrameOutcome::Presented);
        assert_eq!(gpu.count(|c| *c == Call::Recreate), 0);
    }
}

//! Priority-scheduled resource loading
//!
//! Icon decodes are queued with a priority and drained on the UI thread
//! each frame, capped so a burst of submissions cannot blow the frame
//! budget. Non-icon tasks are never capped; when the queue head is an icon
//! and the frame's icon budget is spent, the first queued non-icon task is
//! run instead and the skipped icons go back in order.
//!
//! Submission is allowed from background workers (the title scanner queues
//! an icon task per record); the heap is guarded by its own mutex and only
//! [`ResourceLoadScheduler::process_frame`] runs task bodies, on the UI
//! thread.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Kind of queued work; only icons are budgeted per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Icon,
    Generic,
}

/// Max icon decodes executed per frame.
pub const MAX_ICON_LOADS_PER_FRAME: usize = 2;

struct LoadTask {
    /// 0 is the highest priority.
    priority: u8,
    /// Submission order, tie-breaker within a priority.
    seq: u64,
    kind: TaskKind,
    work: Box<dyn FnOnce() + Send>,
}

impl PartialEq for LoadTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for LoadTask {}

impl PartialOrd for LoadTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LoadTask {
    // BinaryHeap is a max-heap; invert so the smallest (priority, seq)
    // pops first.
    fn cmp(&self, other: &Self) -> Ordering {
        (other.priority, other.seq).cmp(&(self.priority, self.seq))
    }
}

/// Task queue drained once per UI frame.
#[derive(Default)]
pub struct ResourceLoadScheduler {
    pending: Mutex<BinaryHeap<LoadTask>>,
    next_seq: AtomicU64,
}

impl ResourceLoadScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Queue `work` at `priority` (0 = highest).
    pub fn submit<F>(&self, priority: u8, kind: TaskKind, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let seq = self.next_seq.fetch_add(1, AtomicOrdering::Relaxed);
        self.pending.lock().unwrap().push(LoadTask {
            priority,
            seq,
            kind,
            work: Box::new(work),
        });
    }

    /// Run queued tasks for one frame: every non-icon task, and at most
    /// [`MAX_ICON_LOADS_PER_FRAME`] icons.
    pub fn process_frame(&self) {
        let mut icons_this_frame = 0usize;
        let mut pending = self.pending.lock().unwrap();

        while let Some(task) = pending.pop() {
            if task.kind == TaskKind::Icon && icons_this_frame >= MAX_ICON_LOADS_PER_FRAME {
                // Budget spent: look down the queue for a non-icon task,
                // putting every skipped icon back where it was.
                let mut skipped = vec![task];
                let mut bypass = None;
                while let Some(candidate) = pending.pop() {
                    if candidate.kind != TaskKind::Icon {
                        bypass = Some(candidate);
                        break;
                    }
                    skipped.push(candidate);
                }
                for icon in skipped {
                    pending.push(icon);
                }
                match bypass {
                    Some(task) => (task.work)(),
                    None => break,
                }
            } else {
                if task.kind == TaskKind::Icon {
                    icons_this_frame += 1;
                }
                (task.work)();
            }
        }
    }
}

/// Items shown per grid page.
pub const ITEMS_PER_PAGE: usize = 9;
/// Items preloaded past the end of the visible page.
pub const PRELOAD_BUFFER: usize = 3;
/// Calls arriving closer together than this are dropped.
const DEBOUNCE_INTERVAL: Duration = Duration::from_millis(100);

/// Sentinel range meaning "previous range unknown, always reload".
pub const FORCE_RELOAD_RANGE: (usize, usize) = (usize::MAX, usize::MAX);

/// One icon the viewport planner wants loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadRequest {
    pub index: usize,
    pub priority: u8,
}

/// Debounced visible-range planner for the title grid.
///
/// Owned and ticked by the UI thread; sort and index resets call
/// [`ViewportLoader::force_reload`] so the next plan is never
/// short-circuited by the cached range.
#[derive(Debug)]
pub struct ViewportLoader {
    last_range: (usize, usize),
    last_call: Option<Instant>,
}

impl Default for ViewportLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewportLoader {
    pub fn new() -> Self {
        Self {
            last_range: FORCE_RELOAD_RANGE,
            last_call: None,
        }
    }

    /// Drop the cached range so the next call replans unconditionally.
    pub fn force_reload(&mut self) {
        self.last_range = FORCE_RELOAD_RANGE;
    }

    /// Plan icon loads for the page containing `cursor_index`.
    pub fn plan(&mut self, cursor_index: usize, total: usize) -> Vec<LoadRequest> {
        self.plan_at(Instant::now(), cursor_index, total)
    }

    fn plan_at(&mut self, now: Instant, cursor_index: usize, total: usize) -> Vec<LoadRequest> {
        if let Some(last) = self.last_call {
            if now.duration_since(last) < DEBOUNCE_INTERVAL {
                return Vec::new();
            }
        }
        self.last_call = Some(now);

        if total == 0 {
            return Vec::new();
        }

        let page = cursor_index.min(total - 1) / ITEMS_PER_PAGE;
        let visible_start = page * ITEMS_PER_PAGE;
        let visible_end = (visible_start + ITEMS_PER_PAGE).min(total);

        if self.last_range == (visible_start, visible_end) && self.last_range != FORCE_RELOAD_RANGE
        {
            return Vec::new();
        }
        self.last_range = (visible_start, visible_end);

        let load_end = (visible_end + PRELOAD_BUFFER).min(total);

        (visible_start..load_end)
            .map(|index| {
                let priority = if index < visible_start + 4 && index < visible_end {
                    0
                } else if index < visible_end {
                    1
                } else {
                    2
                };
                LoadRequest { index, priority }
            })
            .collect()
    }
}

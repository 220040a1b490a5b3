use std::cell::RefCell;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

// ---------------------------------------------------------------------------
// Progress observer
// ---------------------------------------------------------------------------

/// Observer notified while a flow walks the collection.
///
/// Purely informational: implementations must not influence the computation.
pub trait Progress {
    fn flow_started(&self, _flow: &str, _groups: usize) {}
    fn group_started(&self, _group: &str, _files: usize) {}
    fn file_done(&self, _group: &str, _index: usize, _total: usize) {}
    fn group_finished(&self, _group: &str) {}
    fn finished(&self) {}
}

/// Reports nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl Progress for Silent {}

/// Terminal progress bars: one over groups, one over the current group's files.
pub struct BarProgress {
    multi: MultiProgress,
    groups: RefCell<Option<ProgressBar>>,
    files: RefCell<Option<ProgressBar>>,
}

impl BarProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            groups: RefCell::new(None),
            files: RefCell::new(None),
        }
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

impl Progress for BarProgress {
    fn flow_started(&self, flow: &str, groups: usize) {
        let bar = self.multi.add(ProgressBar::new(groups as u64));
        bar.set_style(style("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}"));
        bar.set_message(flow.to_string());
        *self.groups.borrow_mut() = Some(bar);
    }

    fn group_started(&self, group: &str, files: usize) {
        let bar = self.multi.add(ProgressBar::new(files as u64));
        bar.set_style(style("  {bar:40.green/white} {pos}/{len} {msg}"));
        bar.set_message(group.to_string());
        *self.files.borrow_mut() = Some(bar);
    }

    fn file_done(&self, _group: &str, _index: usize, _total: usize) {
        if let Some(bar) = self.files.borrow().as_ref() {
            bar.inc(1);
        }
    }

    fn group_finished(&self, _group: &str) {
        if let Some(bar) = self.files.borrow_mut().take() {
            bar.finish_and_clear();
            self.multi.remove(&bar);
        }
        if let Some(bar) = self.groups.borrow().as_ref() {
            bar.inc(1);
        }
    }

    /// Also clears the file bar of a group that never finished.
    fn finished(&self) {
        if let Some(bar) = self.files.borrow_mut().take() {
            bar.abandon();
            self.multi.remove(&bar);
        }
        if let Some(bar) = self.groups.borrow_mut().take() {
            bar.finish();
        }
    }
}

/// Forwards progress to the `log` facade at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl Progress for LogProgress {
    fn group_started(&self, group: &str, files: usize) {
        log::debug!("{group}: {files} file(s)");
    }

    fn file_done(&self, group: &str, index: usize, total: usize) {
        log::debug!("{group}: file {} of {total}", index + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_bars_track_groups_and_files() {
        let progress = BarProgress {
            multi: MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden()),
            groups: RefCell::new(None),
            files: RefCell::new(None),
        };
        progress.flow_started("variance_person", 2);
        progress.group_started("chb01", 3);
        for i in 0..3 {
            progress.file_done("chb01", i, 3);
        }
        assert_eq!(progress.files.borrow().as_ref().unwrap().position(), 3);
        progress.group_finished("chb01");
        assert!(progress.files.borrow().is_none());
        assert_eq!(progress.groups.borrow().as_ref().unwrap().position(), 1);
        progress.finished();
        assert!(progress.groups.borrow().is_none());
    }

    #[test]
    fn finishing_mid_group_clears_the_file_bar() {
        let progress = BarProgress {
            multi: MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden()),
            groups: RefCell::new(None),
            files: RefCell::new(None),
        };
        progress.flow_started("variance_file", 1);
        progress.group_started("chb01", 2);
        progress.file_done("chb01", 0, 2);
        progress.finished();
        assert!(progress.files.borrow().is_none());
        assert!(progress.groups.borrow().is_none());
    }
}

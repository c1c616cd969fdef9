use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str =
    "{spinner:.green} {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})";
const SPINNER_TEMPLATE: &str = "{spinner:.green} {msg} [{elapsed_precise}] {bytes} ({bytes_per_sec})";

/// 多个下载共用的终端进度条
#[derive(Clone, Default)]
pub struct DownloadProgress {
    multi_pb: MultiProgress,
}

impl DownloadProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, name: impl Into<String>) -> TaskProgress {
        let pb = self.multi_pb.add(ProgressBar::new_spinner());
        if let Ok(style) = ProgressStyle::with_template(SPINNER_TEMPLATE) {
            pb.set_style(style);
        }
        pb.set_message(name.into());
        TaskProgress {
            pb,
            sized: false,
        }
    }
}

/// 单个下载的进度条，总大小未知时显示为 spinner
#[derive(Clone)]
pub struct TaskProgress {
    pb: ProgressBar,
    sized: bool,
}

impl TaskProgress {
    pub fn update(&mut self, downloaded: u64, expected: Option<u64>) {
        if let (Some(total), false) = (expected, self.sized) {
            if let Ok(style) = ProgressStyle::with_template(BAR_TEMPLATE) {
                self.pb.set_style(style.progress_chars("#>-"));
            }
            self.pb.set_length(total);
            self.sized = true;
        }
        self.pb.set_position(downloaded);
    }

    pub fn finish(&self, message: impl Into<String>) {
        self.pb.finish_with_message(message.into());
    }

    pub fn abandon(&self, message: impl Into<String>) {
        self.pb.abandon_with_message(message.into());
    }
}

use clap::Parser;
use std::path::PathBuf;

/// 文件下载管理器
#[derive(Parser, Debug)]
#[command(name = "dlm")]
#[command(version)]
#[command(about = "按URL去重、支持取消的文件下载工具", long_about = None)]
pub struct Cli {
    /// 下载链接，可以重复指定多个
    #[arg(long = "url", value_name = "URL", required = true)]
    #[arg(value_hint = clap::ValueHint::Url)]
    pub urls: Vec<String>,

    /// 文件保存目录
    #[arg(long, value_name = "DIR")]
    #[arg(default_value = ".")]
    #[arg(value_hint = clap::ValueHint::DirPath)]
    pub output_dir: PathBuf,

    /// JSON 配置文件
    #[arg(long, value_name = "FILE")]
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// 取消下载时删除已写入的部分文件
    #[arg(long)]
    pub remove_partial: bool,

    /// 输出调试日志
    #[arg(short, long)]
    pub verbose: bool,
}

use std::path::{Path, PathBuf};

use url::Url;

const FALLBACK_NAME: &str = "download.bin";

/// 从 URL 推导保存用的文件名：取路径最后一段，去掉不安全字符
pub fn file_name_from_url(raw: &str) -> String {
    let name = Url::parse(raw)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .map(|segment| {
            urlencoding::decode(&segment)
                .map(|decoded| decoded.into_owned())
                .unwrap_or(segment)
                .chars()
                .map(|c| match c {
                    '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                    c if c.is_control() => '_',
                    c => c,
                })
                .collect::<String>()
        })
        .unwrap_or_default();

    let name = name.trim().trim_matches('.');
    if name.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        name.to_string()
    }
}

/// 目标目录下的输出路径；`taken` 中已占用的名字会追加序号
pub fn output_path_for(dir: &Path, raw_url: &str, taken: &[PathBuf]) -> PathBuf {
    let name = file_name_from_url(raw_url);
    let candidate = dir.join(&name);
    if !taken.contains(&candidate) {
        return candidate;
    }

    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), format!(".{}", ext)),
        _ => (name.clone(), String::new()),
    };
    (1..)
        .map(|n| dir.join(format!("{}({}){}", stem, n, ext)))
        .find(|path| !taken.contains(path))
        .unwrap_or(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(
            file_name_from_url("https://example.com/files/archive.tar.gz?x=1"),
            "archive.tar.gz"
        );
        assert_eq!(
            file_name_from_url("https://example.com/a/my%20file.txt"),
            "my file.txt"
        );
        assert_eq!(file_name_from_url("https://example.com/a+b.txt"), "a+b.txt");
        assert_eq!(file_name_from_url("https://example.com/"), FALLBACK_NAME);
        assert_eq!(file_name_from_url("https://example.com/..%2F.."), "_");
        assert_eq!(file_name_from_url("not a url"), FALLBACK_NAME);
    }

    #[test]
    fn test_output_path_avoids_taken_names() {
        let dir = Path::new("/downloads");
        let first = output_path_for(dir, "https://a.example/data.csv", &[]);
        assert_eq!(first, dir.join("data.csv"));

        let second = output_path_for(dir, "https://b.example/data.csv", &[first.clone()]);
        assert_eq!(second, dir.join("data(1).csv"));

        let third = output_path_for(
            dir,
            "https://c.example/data.csv",
            &[first, second],
        );
        assert_eq!(third, dir.join("data(2).csv"));
    }
}

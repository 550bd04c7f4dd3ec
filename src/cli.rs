// CLI subcommand definitions using clap derive macros
use clap::Parser;
use std::path::{Path, PathBuf};

use crate::config::{self, Config};
use crate::error::LoadTestError;
use crate::reporter::{compare_results, read_json_result};

/// 短縮URLクリック数の精度検証ツール
#[derive(Parser, Debug, PartialEq)]
#[command(name = "shortlink-load-test")]
pub enum Cli {
    /// 精度検証を実行する
    Run {
        /// JSON設定ファイルパス (省略時はデフォルト設定)
        #[arg(long)]
        config: Option<PathBuf>,
        /// 対象サーバのベースURL (BASE_URL より優先)
        #[arg(long)]
        base_url: Option<String>,
        /// 仮想クライアント数 (iterations も同じ値になる)
        #[arg(long)]
        vus: Option<u64>,
        /// 検証前の待機時間 (ミリ秒)
        #[arg(long)]
        settle_ms: Option<u64>,
        /// JSON結果出力先
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// 結果を比較する
    Compare {
        /// 現在の結果JSONファイル
        current: PathBuf,
        /// 過去の結果JSONファイル
        previous: PathBuf,
    },
}

/// 設定を組み立てる
///
/// 優先順位: コマンドライン引数 > 環境変数 > 設定ファイル > デフォルト値。
/// 最後にまとめてバリデーションを行う。
pub fn resolve_config(
    config_path: Option<&Path>,
    base_url: Option<String>,
    vus: Option<u64>,
    settle_ms: Option<u64>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Config, LoadTestError> {
    let mut config = match config_path {
        Some(path) => config::parse_file(path)?,
        None => Config::default(),
    };
    config.apply_overrides_from(env)?;
    if let Some(url) = base_url {
        config.base_url = url;
    }
    if let Some(n) = vus {
        config.set_population(n);
    }
    if let Some(ms) = settle_ms {
        config.settle_interval_ms = ms;
    }
    config::check(&config)?;
    Ok(config)
}

/// compareサブコマンドの実行
///
/// 2つのJSON結果ファイルを読み込み、compare_resultsで比較し、
/// 比較レポートをJSON形式で標準出力に表示する。
pub fn run_compare(current_path: &Path, previous_path: &Path) -> Result<(), LoadTestError> {
    let current = read_json_result(current_path)?;
    let previous = read_json_result(previous_path)?;

    let report = compare_results(&current, &previous);
    let report_json = serde_json::to_string_pretty(&report).map_err(|e| {
        LoadTestError::ResultFile(format!("Failed to serialize comparison report: {}", e))
    })?;
    println!("{}", report_json);
    Ok(())
}

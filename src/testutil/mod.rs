use std::sync::atomic::{AtomicI64, AtomicU16, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::api::{self, STATUS_FOUND, STATUS_OK};
use crate::error::LoadTestError;
use crate::transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, TransportFuture};

/// テスト用のインメモリ短縮URLサーバ
/// - クリック数のアトミックなカウント
/// - 各エンドポイントの呼び出し回数の記録
/// - 障害注入 (ヘルスチェック失敗, カウント欠落, 二重カウント, 通信エラー)
pub struct MockShortener {
    pub short_code: String,
    pub long_url: String,
    pub health_status: AtomicU16,
    pub create_status: AtomicU16,
    pub create_body: Mutex<Option<String>>,
    pub stats_status: AtomicU16,
    pub stats_body: Mutex<Option<String>>,
    clicks: Arc<AtomicI64>,
    pub health_calls: AtomicU64,
    pub create_calls: AtomicU64,
    pub redirect_calls: AtomicU64,
    pub stats_calls: AtomicU64,
    lose_budget: AtomicU64,
    double_budget: AtomicU64,
    transport_fail_budget: AtomicU64,
    redirect_delay: Mutex<Option<Duration>>,
    propagation_delay: Mutex<Option<Duration>>,
    redirect_codes: Mutex<Vec<String>>,
    last_redirect_at: Mutex<Option<Instant>>,
    stats_queried_at: Mutex<Option<Instant>>,
}

impl Default for MockShortener {
    fn default() -> Self {
        Self::new()
    }
}

impl MockShortener {
    pub fn new() -> Self {
        Self {
            short_code: "3e8".to_string(),
            long_url: "https://accuracy-test.com/concurrent".to_string(),
            health_status: AtomicU16::new(STATUS_OK),
            create_status: AtomicU16::new(STATUS_OK),
            create_body: Mutex::new(None),
            stats_status: AtomicU16::new(STATUS_OK),
            stats_body: Mutex::new(None),
            clicks: Arc::new(AtomicI64::new(0)),
            health_calls: AtomicU64::new(0),
            create_calls: AtomicU64::new(0),
            redirect_calls: AtomicU64::new(0),
            stats_calls: AtomicU64::new(0),
            lose_budget: AtomicU64::new(0),
            double_budget: AtomicU64::new(0),
            transport_fail_budget: AtomicU64::new(0),
            redirect_delay: Mutex::new(None),
            propagation_delay: Mutex::new(None),
            redirect_codes: Mutex::new(Vec::new()),
            last_redirect_at: Mutex::new(None),
            stats_queried_at: Mutex::new(None),
        }
    }

    pub fn set_health_status(&self, status: u16) {
        self.health_status.store(status, Ordering::Relaxed);
    }

    pub fn set_create_status(&self, status: u16) {
        self.create_status.store(status, Ordering::Relaxed);
    }

    /// 作成レスポンスのボディを差し替える
    pub fn set_create_body(&self, body: &str) {
        *self.create_body.lock().unwrap() = Some(body.to_string());
    }

    pub fn set_stats_status(&self, status: u16) {
        self.stats_status.store(status, Ordering::Relaxed);
    }

    pub fn set_stats_body(&self, body: &str) {
        *self.stats_body.lock().unwrap() = Some(body.to_string());
    }

    /// 最初の n 件のリダイレクトでカウントを欠落させる
    pub fn lose_increments(&self, n: u64) {
        self.lose_budget.store(n, Ordering::Relaxed);
    }

    /// 最初の n 件のリダイレクトを二重にカウントする
    pub fn double_count(&self, n: u64) {
        self.double_budget.store(n, Ordering::Relaxed);
    }

    /// 最初の n 件のリダイレクトを通信エラー (status 0) にする
    pub fn fail_redirects(&self, n: u64) {
        self.transport_fail_budget.store(n, Ordering::Relaxed);
    }

    pub fn set_redirect_delay(&self, delay: Duration) {
        *self.redirect_delay.lock().unwrap() = Some(delay);
    }

    /// カウント反映を非同期に遅延させる
    pub fn set_propagation_delay(&self, delay: Duration) {
        *self.propagation_delay.lock().unwrap() = Some(delay);
    }

    pub fn clicks(&self) -> i64 {
        self.clicks.load(Ordering::SeqCst)
    }

    pub fn redirect_codes(&self) -> Vec<String> {
        self.redirect_codes.lock().unwrap().clone()
    }

    pub fn last_redirect_at(&self) -> Option<Instant> {
        *self.last_redirect_at.lock().unwrap()
    }

    pub fn stats_queried_at(&self) -> Option<Instant> {
        *self.stats_queried_at.lock().unwrap()
    }

    fn handle(&self, request: &HttpRequest) -> Result<HttpResponse, LoadTestError> {
        let redirect_prefix = format!("{}/", api::CREATE_PATH);
        match request.method {
            HttpMethod::Get if request.path == api::HEALTH_PATH => {
                self.health_calls.fetch_add(1, Ordering::Relaxed);
                Ok(respond(self.health_status.load(Ordering::Relaxed), "{\"status\":\"ok\"}"))
            }
            HttpMethod::Post if request.path == api::CREATE_PATH => {
                self.create_calls.fetch_add(1, Ordering::Relaxed);
                let status = self.create_status.load(Ordering::Relaxed);
                if status != STATUS_OK {
                    return Ok(respond(status, "{\"error\":\"internal server error\"}"));
                }
                let body = self
                    .create_body
                    .lock()
                    .unwrap()
                    .clone()
                    .unwrap_or_else(|| format!("{{\"short_code\":\"{}\"}}", self.short_code));
                Ok(respond(status, &body))
            }
            HttpMethod::Get if request.path.starts_with("/stats/") => {
                self.stats_calls.fetch_add(1, Ordering::Relaxed);
                *self.stats_queried_at.lock().unwrap() = Some(Instant::now());
                let status = self.stats_status.load(Ordering::Relaxed);
                if status != STATUS_OK {
                    return Ok(respond(status, "{\"error\":\"internal server error\"}"));
                }
                if request.path != api::stats_path(&self.short_code) {
                    return Ok(respond(404, ""));
                }
                let body = self.stats_body.lock().unwrap().clone().unwrap_or_else(|| {
                    format!(
                        "{{\"long_url\":\"{}\",\"created_at\":\"2024-01-01T00:00:00Z\",\"expires_at\":\"2024-01-02T00:00:00Z\",\"click_count\":{},\"last_accessed_at\":null}}",
                        self.long_url,
                        self.clicks()
                    )
                });
                Ok(respond(status, &body))
            }
            HttpMethod::Get if request.path.starts_with(&redirect_prefix) => {
                self.redirect_calls.fetch_add(1, Ordering::Relaxed);
                let code = &request.path[redirect_prefix.len()..];
                self.redirect_codes.lock().unwrap().push(code.to_string());
                if take_one(&self.transport_fail_budget) {
                    return Err(LoadTestError::Transport("mock connection reset".to_string()));
                }
                if code != self.short_code {
                    return Ok(respond(404, ""));
                }
                let increment = if take_one(&self.lose_budget) {
                    0
                } else if take_one(&self.double_budget) {
                    2
                } else {
                    1
                };
                self.apply_increment(increment);
                *self.last_redirect_at.lock().unwrap() = Some(Instant::now());
                Ok(respond(STATUS_FOUND, ""))
            }
            _ => Ok(respond(404, "")),
        }
    }

    fn apply_increment(&self, increment: i64) {
        if increment == 0 {
            return;
        }
        let delay = *self.propagation_delay.lock().unwrap();
        match delay {
            Some(delay) => {
                let clicks = self.clicks.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    clicks.fetch_add(increment, Ordering::SeqCst);
                });
            }
            None => {
                self.clicks.fetch_add(increment, Ordering::SeqCst);
            }
        }
    }
}

impl HttpTransport for MockShortener {
    fn send<'a>(&'a self, request: &'a HttpRequest) -> TransportFuture<'a> {
        Box::pin(async move {
            let delay = *self.redirect_delay.lock().unwrap();
            if let Some(delay) = delay {
                if request.path.starts_with("/s/") {
                    tokio::time::sleep(delay).await;
                }
            }
            self.handle(request)
        })
    }
}

fn respond(status: u16, body: &str) -> HttpResponse {
    HttpResponse {
        status,
        body: body.to_string(),
    }
}

fn take_one(budget: &AtomicU64) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

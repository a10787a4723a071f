//! Page rendering through a W3C WebDriver endpoint.
//!
//! The crawl only needs a narrow capability: load a URL in the listing tab or
//! in a side tab and hand back the rendered DOM. [`PageRenderer`] is that
//! capability; [`WebDriverSession`] implements it over plain HTTP.

use std::fs::{self, File};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use url::Url;

use super::config::{Config, WebDriverOptions};
use super::error::{CrawlError, Result};
use super::types::{BrowserArg, RenderedPage, TabHandle};

#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Load `url` in the listing tab and snapshot it.
    async fn navigate(&self, url: &str) -> Result<RenderedPage>;

    async fn open_tab(&self) -> Result<TabHandle>;

    /// Load `url` in a side tab; the listing tab keeps its page.
    async fn navigate_tab(&self, tab: &TabHandle, url: &str) -> Result<RenderedPage>;

    async fn close_tab(&self, tab: TabHandle) -> Result<()>;
}

/// Starts the browser a run crawls with and tears it down afterwards.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    type Browser: PageRenderer;

    async fn launch(&self, config: &Config) -> Result<Self::Browser>;

    /// Called exactly once for every successful `launch`, on success and
    /// failure paths alike. Never fails.
    async fn shutdown(&self, browser: Self::Browser);
}

/// Launches a local or configured WebDriver and opens one session on it.
pub struct WebDriverLauncher;

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    type Browser = WebDriverSession;

    async fn launch(&self, config: &Config) -> Result<WebDriverSession> {
        WebDriverSession::launch(&config.webdriver, config.nav_timeout).await
    }

    async fn shutdown(&self, browser: WebDriverSession) {
        browser.quit().await;
    }
}

const VIEWPORT: (u32, u32) = (1920, 1080);

/// How long the resource list must stay unchanged before a page counts as
/// settled.
const QUIET_WINDOW_MS: u64 = 500;

const SNAPSHOT_SCRIPT: &str = r#"
    return {
        url: window.location.href || "",
        html: document.documentElement ? document.documentElement.outerHTML : ""
    };
"#;

const NETWORK_QUIET_SCRIPT: &str = r#"
    const done = arguments[arguments.length - 1];
    const quietMs = arguments[0];
    const count = () => performance.getEntriesByType('resource').length;
    let last = count();
    let since = Date.now();
    const tick = () => {
        const now = count();
        if (now !== last) {
            last = now;
            since = Date.now();
        }
        if (document.readyState === 'complete' && Date.now() - since >= quietMs) {
            done(true);
        } else {
            setTimeout(tick, 100);
        }
    };
    tick();
"#;

pub struct WebDriverSession {
    client: reqwest::Client,
    endpoint: String,
    session_id: String,
    main_handle: String,
    profile_dir: Option<PathBuf>,
    driver: Option<DriverProcess>,
}

impl WebDriverSession {
    /// Make a driver available (see [`ensure_webdriver_ready`]) and open a
    /// session on it. A driver started here lives as long as the session.
    pub async fn launch(options: &WebDriverOptions, nav_timeout: Duration) -> Result<Self> {
        let (endpoint, driver) = ensure_webdriver_ready(options).await?;
        let mut session = Self::connect(&endpoint, options, nav_timeout).await?;
        session.driver = driver;
        Ok(session)
    }

    pub async fn connect(
        endpoint: &str,
        options: &WebDriverOptions,
        nav_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(nav_timeout + Duration::from_secs(15))
            .build()
            .map_err(|e| CrawlError::Session(format!("webdriver client build failed: {e}")))?;
        let endpoint = endpoint.trim_end_matches('/').to_string();

        let profile_dir = match options.browser {
            BrowserArg::Chrome => Some(create_profile_dir()?),
            BrowserArg::Firefox | BrowserArg::Edge => None,
        };
        let caps = webdriver_capabilities(
            options.browser,
            options.headless,
            nav_timeout,
            profile_dir.as_deref(),
        );
        let created = webdriver_request(
            &client,
            Method::POST,
            &format!("{endpoint}/session"),
            Some(caps),
        )
        .await
        .map_err(|e| format!("session create failed: {e}"))
        .and_then(|created| {
            created
                .pointer("/sessionId")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or_else(|| {
                    format!(
                        "session id missing in response: {}",
                        truncate_for_log(&created.to_string(), 220)
                    )
                })
        });
        let session_id = match created {
            Ok(id) => id,
            Err(message) => {
                if let Some(dir) = &profile_dir {
                    remove_profile_dir(dir);
                }
                return Err(CrawlError::Session(message));
            }
        };

        let mut session = Self {
            client,
            endpoint,
            session_id,
            main_handle: String::new(),
            profile_dir,
            driver: None,
        };

        let prepared = session.prepare_main_window().await;
        match prepared {
            Ok(handle) if !handle.is_empty() => session.main_handle = handle,
            Ok(_) => {
                session.quit().await;
                return Err(CrawlError::Session(
                    "webdriver returned no window handle".to_string(),
                ));
            }
            Err(err) => {
                session.quit().await;
                return Err(CrawlError::Session(format!("session setup failed: {err}")));
            }
        }

        info!(
            session = session.session_id.as_str(),
            browser = ?options.browser,
            headless = options.headless,
            "browser session opened"
        );
        Ok(session)
    }

    /// End the browser session, remove its profile directory and stop a
    /// driver started for it. Failures are logged, never raised, so this is
    /// safe to call on every exit path.
    pub async fn quit(self) {
        let url = format!("{}/session/{}", self.endpoint, self.session_id);
        match webdriver_request(&self.client, Method::DELETE, &url, None).await {
            Ok(_) => debug!(session = self.session_id.as_str(), "browser session closed"),
            Err(err) => warn!(
                session = self.session_id.as_str(),
                error = err.as_str(),
                "browser session close failed"
            ),
        }
        if let Some(dir) = &self.profile_dir {
            remove_profile_dir(dir);
        }
        drop(self.driver);
    }

    async fn prepare_main_window(&self) -> std::result::Result<String, String> {
        self.command(
            Method::POST,
            "window/rect",
            Some(json!({ "width": VIEWPORT.0, "height": VIEWPORT.1 })),
        )
        .await?;
        let handle = self.command(Method::GET, "window", None).await?;
        Ok(handle.as_str().unwrap_or_default().to_string())
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> std::result::Result<Value, String> {
        let url = format!("{}/session/{}/{}", self.endpoint, self.session_id, path);
        webdriver_request(&self.client, method, &url, body).await
    }

    async fn switch_to(&self, handle: &str) -> Result<()> {
        self.command(Method::POST, "window", Some(json!({ "handle": handle })))
            .await
            .map(|_| ())
            .map_err(|e| CrawlError::Session(format!("switch to window {handle} failed: {e}")))
    }

    async fn load(&self, url: &str) -> Result<RenderedPage> {
        self.command(Method::POST, "url", Some(json!({ "url": url })))
            .await
            .map_err(|e| CrawlError::navigation(url, e))?;
        self.command(
            Method::POST,
            "execute/async",
            Some(json!({ "script": NETWORK_QUIET_SCRIPT, "args": [QUIET_WINDOW_MS] })),
        )
        .await
        .map_err(|e| CrawlError::navigation(url, format!("page never settled: {e}")))?;

        let snapshot = self
            .command(
                Method::POST,
                "execute/sync",
                Some(json!({ "script": SNAPSHOT_SCRIPT, "args": [] })),
            )
            .await
            .map_err(|e| CrawlError::navigation(url, format!("snapshot failed: {e}")))?;
        let rendered_url = snapshot
            .pointer("/url")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let html = snapshot
            .pointer("/html")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        if rendered_url.is_empty() || html.is_empty() {
            return Err(CrawlError::navigation(url, "empty rendered snapshot"));
        }

        debug!(url, bytes = html.len(), "page rendered");
        Ok(RenderedPage {
            url: rendered_url.to_string(),
            html: html.to_string(),
        })
    }
}

#[async_trait]
impl PageRenderer for WebDriverSession {
    async fn navigate(&self, url: &str) -> Result<RenderedPage> {
        self.load(url).await
    }

    async fn open_tab(&self) -> Result<TabHandle> {
        let opened = self
            .command(Method::POST, "window/new", Some(json!({ "type": "tab" })))
            .await
            .map_err(|e| CrawlError::Session(format!("open tab failed: {e}")))?;
        opened
            .pointer("/handle")
            .and_then(|v| v.as_str())
            .map(|h| TabHandle(h.to_string()))
            .ok_or_else(|| CrawlError::Session("new tab returned no handle".to_string()))
    }

    async fn navigate_tab(&self, tab: &TabHandle, url: &str) -> Result<RenderedPage> {
        self.switch_to(&tab.0).await?;
        let loaded = self.load(url).await;
        self.switch_to(&self.main_handle).await?;
        loaded
    }

    async fn close_tab(&self, tab: TabHandle) -> Result<()> {
        self.switch_to(&tab.0).await?;
        self.command(Method::DELETE, "window", None)
            .await
            .map_err(|e| CrawlError::Session(format!("close tab failed: {e}")))?;
        self.switch_to(&self.main_handle).await
    }
}

/// Send one WebDriver command and unwrap its `value`, turning protocol
/// errors into `"<error>: <message>"`.
async fn webdriver_request(
    client: &reqwest::Client,
    method: Method,
    url: &str,
    body: Option<Value>,
) -> std::result::Result<Value, String> {
    let mut request = client.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let res = request
        .send()
        .await
        .map_err(|e| format!("request failed: {e}"))?;
    let status = res.status();
    let text = res
        .text()
        .await
        .map_err(|e| format!("response read failed: {e}"))?;

    let value: Value = serde_json::from_str(&text).unwrap_or_default();
    if let Some(err) = value.pointer("/value/error").and_then(|v| v.as_str()) {
        let message = value
            .pointer("/value/message")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown webdriver error");
        return Err(format!("{err}: {}", truncate_for_log(message, 240)));
    }
    if !status.is_success() {
        return Err(format!(
            "HTTP {}: {}",
            status.as_u16(),
            truncate_for_log(&text, 240)
        ));
    }

    Ok(value.get("value").cloned().unwrap_or(Value::Null))
}

fn webdriver_capabilities(
    browser: BrowserArg,
    headless: bool,
    nav_timeout: Duration,
    profile_dir: Option<&Path>,
) -> Value {
    let timeouts = json!({
        "pageLoad": nav_timeout.as_millis() as u64,
        "script": nav_timeout.as_millis() as u64,
    });
    match browser {
        BrowserArg::Firefox => {
            let mut args = vec![
                format!("--width={}", VIEWPORT.0),
                format!("--height={}", VIEWPORT.1),
            ];
            if headless {
                args.push("-headless".to_string());
            }
            json!({
                "capabilities": {
                    "alwaysMatch": {
                        "browserName": "firefox",
                        "acceptInsecureCerts": true,
                        "pageLoadStrategy": "normal",
                        "timeouts": timeouts,
                        "moz:firefoxOptions": {
                            "args": args,
                            "prefs": { "privacy.donottrackheader.enabled": true }
                        }
                    }
                }
            })
        }
        BrowserArg::Edge => json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "MicrosoftEdge",
                    "acceptInsecureCerts": true,
                    "pageLoadStrategy": "normal",
                    "timeouts": timeouts,
                    "ms:edgeOptions": chromium_options(headless, profile_dir)
                }
            }
        }),
        BrowserArg::Chrome => json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "acceptInsecureCerts": true,
                    "pageLoadStrategy": "normal",
                    "timeouts": timeouts,
                    "goog:chromeOptions": chromium_options(headless, profile_dir)
                }
            }
        }),
    }
}

/// Options shared by Chrome and Edge. `enable_do_not_track` makes every
/// request carry `DNT: 1`, like the Firefox pref above.
fn chromium_options(headless: bool, profile_dir: Option<&Path>) -> Value {
    json!({
        "args": chromium_args(headless, profile_dir),
        "prefs": { "enable_do_not_track": true }
    })
}

fn chromium_args(headless: bool, profile_dir: Option<&Path>) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(dir) = profile_dir {
        args.push(format!("--user-data-dir={}", dir.display()));
    }
    if headless {
        args.push("--headless=new".to_string());
    }
    args.push(format!("--window-size={},{}", VIEWPORT.0, VIEWPORT.1));
    args.push("--disable-gpu".to_string());
    args.push("--disable-dev-shm-usage".to_string());
    args.push("--no-first-run".to_string());
    args.push("--no-default-browser-check".to_string());
    if !cfg!(target_os = "macos") {
        args.push("--no-sandbox".to_string());
    }
    args
}

/// A fresh Chrome profile per session, so runs never share cookies.
fn create_profile_dir() -> Result<PathBuf> {
    let dir = std::env::temp_dir().join(format!(
        "wishwatch-chrome-profile-{}-{}",
        std::process::id(),
        Utc::now().timestamp_millis()
    ));
    fs::create_dir_all(&dir).map_err(|e| {
        CrawlError::Session(format!(
            "failed to create browser profile {}: {e}",
            dir.display()
        ))
    })?;
    Ok(dir)
}

fn remove_profile_dir(dir: &Path) {
    match fs::remove_dir_all(dir) {
        Ok(()) => debug!(path = %dir.display(), "browser profile removed"),
        Err(err) => warn!(path = %dir.display(), error = %err, "browser profile not removed"),
    }
}

/// A driver binary started by this process. Killed when dropped.
pub struct DriverProcess {
    child: Child,
    binary: String,
}

impl Drop for DriverProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        debug!(binary = self.binary.as_str(), "webdriver stopped");
    }
}

/// Find a usable WebDriver endpoint, starting a local driver unless
/// autostart is disabled.
pub async fn ensure_webdriver_ready(
    options: &WebDriverOptions,
) -> Result<(String, Option<DriverProcess>)> {
    if options.autostart {
        let port = find_free_local_port().map_err(CrawlError::Session)?;
        let endpoint = format!("http://127.0.0.1:{port}");
        match start_webdriver(options, &endpoint, port).await {
            Ok(process) => {
                info!(endpoint = endpoint.as_str(), binary = process.binary.as_str(), "webdriver started");
                return Ok((endpoint, Some(process)));
            }
            Err(err) => {
                warn!(error = err.as_str(), "webdriver autostart failed, trying configured endpoint");
            }
        }
    }

    if webdriver_reachable(&options.endpoint).await {
        info!(endpoint = options.endpoint.as_str(), "using running webdriver");
        return Ok((options.endpoint.clone(), None));
    }

    Err(CrawlError::Session(format!(
        "no webdriver available: autostart {} and {} is unreachable",
        if options.autostart { "failed" } else { "disabled" },
        options.endpoint
    )))
}

async fn start_webdriver(
    options: &WebDriverOptions,
    endpoint: &str,
    port: u16,
) -> std::result::Result<DriverProcess, String> {
    let candidates = match &options.binary {
        Some(bin) => vec![bin.clone()],
        None => driver_candidates(options.browser)
            .iter()
            .map(|s| s.to_string())
            .collect(),
    };

    let log_path = webdriver_log_path(port);
    let mut last_err = String::new();
    for binary in candidates {
        if !webdriver_binary_available(&binary) {
            last_err = format!("{binary} not found");
            continue;
        }
        let mut cmd = Command::new(&binary);
        configure_webdriver_command(&mut cmd, &binary, port);
        let log_file = File::options()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&log_path)
            .map_err(|e| format!("failed to open webdriver log {}: {e}", log_path.display()))?;
        let log_file_err = log_file
            .try_clone()
            .map_err(|e| format!("failed to clone webdriver log handle: {e}"))?;
        cmd.stdout(Stdio::from(log_file))
            .stderr(Stdio::from(log_file_err))
            .stdin(Stdio::null());

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                last_err = format!("failed to spawn {binary}: {err}");
                continue;
            }
        };
        let mut process = DriverProcess {
            child,
            binary: binary.clone(),
        };

        let steps = (options.start_timeout.as_millis() / 200).max(1);
        let mut failure = format!("{binary} did not become ready in time");
        for _ in 0..steps {
            if webdriver_reachable(endpoint).await {
                return Ok(process);
            }
            if let Ok(Some(status)) = process.child.try_wait() {
                failure = format!("{binary} exited early with status {status}");
                break;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        if let Some(tail) = read_log_tail(&log_path, 20) {
            failure = format!("{failure} (log tail: {tail})");
        }
        last_err = failure;
        drop(process);
    }

    Err(if last_err.is_empty() {
        "no suitable webdriver binary found".to_string()
    } else {
        last_err
    })
}

fn driver_candidates(browser: BrowserArg) -> &'static [&'static str] {
    match browser {
        BrowserArg::Chrome => &["chromedriver"],
        BrowserArg::Firefox => &["geckodriver"],
        BrowserArg::Edge => &["msedgedriver"],
    }
}

fn configure_webdriver_command(cmd: &mut Command, bin: &str, port: u16) {
    if bin.to_ascii_lowercase().contains("geckodriver") {
        cmd.arg("--port").arg(port.to_string());
        return;
    }
    cmd.arg(format!("--port={port}"));
    cmd.arg("--log-level=SEVERE");
}

fn webdriver_binary_available(bin: &str) -> bool {
    let p = Path::new(bin);
    if p.components().count() > 1 || p.is_absolute() {
        return p.exists();
    }
    Command::new(bin)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

async fn webdriver_reachable(endpoint: &str) -> bool {
    let Ok(parsed) = Url::parse(endpoint) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    let port = parsed.port_or_known_default().unwrap_or(4444);
    matches!(
        tokio::time::timeout(
            Duration::from_secs(2),
            tokio::net::TcpStream::connect((host, port))
        )
        .await,
        Ok(Ok(_))
    )
}

fn find_free_local_port() -> std::result::Result<u16, String> {
    let listener =
        TcpListener::bind("127.0.0.1:0").map_err(|e| format!("free port bind failed: {e}"))?;
    listener
        .local_addr()
        .map(|addr| addr.port())
        .map_err(|e| format!("local addr failed: {e}"))
}

fn webdriver_log_path(port: u16) -> PathBuf {
    std::env::temp_dir().join(format!("wishwatch-webdriver-{port}.log"))
}

fn read_log_tail(path: &Path, lines: usize) -> Option<String> {
    let text = fs::read_to_string(path).ok()?;
    let mut tail = text.lines().rev().take(lines.max(1)).collect::<Vec<_>>();
    tail.reverse();
    let tail = tail.join(" | ");
    if tail.is_empty() { None } else { Some(tail) }
}

fn truncate_for_log(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    input.chars().take(max_chars).collect::<String>() + "..."
}

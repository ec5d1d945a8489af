//! Integration tests for the crawler
//!
//! Orchestration properties run against a scripted in-memory fetcher so
//! timing and failures are under the test's control. The reqwest-backed
//! fetcher and a full crawl over HTTP use wiremock mock servers.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use sumi_harvest::aggregate::{DuplicatePage, PageStatus};
use sumi_harvest::config::{Config, TraversalOrder};
use sumi_harvest::crawler::{
    start_crawl, CrawlEvent, FetchResponse, HttpFetcher, PageFetcher, TaskOutcome,
    TerminationReason,
};
use sumi_harvest::extract::fields;
use sumi_harvest::{FetchError, HarvestError};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SITE: &str = "http://acme.test";

enum Scripted {
    Page {
        html: String,
        delay: Duration,
        retry_after: Option<Duration>,
    },
    /// Lands on another scripted page
    Redirect { to: String },
    Status {
        status: u16,
        retry_after: Option<Duration>,
    },
    NetworkError,
}

/// Serves canned pages by URL and records every fetch
#[derive(Default)]
struct ScriptedFetcher {
    pages: HashMap<String, Scripted>,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl ScriptedFetcher {
    fn page(self, path: &str, html: &str) -> Self {
        self.slow_page(path, html, Duration::ZERO)
    }

    fn slow_page(self, path: &str, html: &str, delay: Duration) -> Self {
        self.script(
            path,
            Scripted::Page {
                html: html.to_string(),
                delay,
                retry_after: None,
            },
        )
    }

    /// A 200 that also asks the client to hold off for `retry_after`
    fn paced_page(self, path: &str, html: &str, retry_after: Duration) -> Self {
        self.script(
            path,
            Scripted::Page {
                html: html.to_string(),
                delay: Duration::ZERO,
                retry_after: Some(retry_after),
            },
        )
    }

    fn redirect(self, path: &str, to: &str) -> Self {
        self.script(path, Scripted::Redirect { to: page_url(to) })
    }

    fn status(self, path: &str, status: u16, retry_after: Option<Duration>) -> Self {
        self.script(path, Scripted::Status { status, retry_after })
    }

    fn broken(self, path: &str) -> Self {
        self.script(path, Scripted::NetworkError)
    }

    fn script(mut self, path: &str, response: Scripted) -> Self {
        self.pages.insert(page_url(path), response);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    /// When the first fetch of `path` started
    fn call_time(&self, path: &str) -> Instant {
        let target = page_url(path);
        self.calls
            .lock()
            .unwrap()
            .iter()
            .find(|(url, _)| *url == target)
            .map(|(_, at)| *at)
            .unwrap_or_else(|| panic!("{} was never fetched", target))
    }

    async fn respond(&self, url: &str) -> Result<FetchResponse, FetchError> {
        match self.pages.get(url) {
            Some(Scripted::Page {
                html,
                delay,
                retry_after,
            }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(*delay).await;
                }
                Ok(FetchResponse {
                    content: Some(html.clone()),
                    status_code: 200,
                    final_url: url.to_string(),
                    duration: *delay,
                    retry_after: *retry_after,
                })
            }
            Some(Scripted::Redirect { to }) => match self.pages.get(to) {
                Some(Scripted::Page { html, .. }) => Ok(FetchResponse {
                    content: Some(html.clone()),
                    status_code: 200,
                    final_url: to.clone(),
                    duration: Duration::ZERO,
                    retry_after: None,
                }),
                _ => Err(FetchError::Http {
                    url: to.clone(),
                    status: 404,
                    retry_after: None,
                }),
            },
            Some(Scripted::Status {
                status,
                retry_after,
            }) => Err(FetchError::Http {
                url: url.to_string(),
                status: *status,
                retry_after: *retry_after,
            }),
            Some(Scripted::NetworkError) => Err(FetchError::Network {
                url: url.to_string(),
                message: "Connection refused".to_string(),
            }),
            None => Err(FetchError::Http {
                url: url.to_string(),
                status: 404,
                retry_after: None,
            }),
        }
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchResponse, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), Instant::now()));
        self.respond(url.as_str()).await
    }
}

/// Creates a fast test configuration
fn create_test_config(max_depth: u32, max_pages: usize) -> Config {
    let mut config = Config::default();
    config.crawler.max_depth = max_depth;
    config.crawler.max_pages = max_pages;
    config.crawler.per_fetch_timeout_s = 5;
    config.rate_limit.per_domain_rate_ms = 0;
    config.rate_limit.max_backoff_ms = 50;
    config.user_agent.crawler_name = "TestBot".to_string();
    config
}

fn links(paths: &[&str]) -> String {
    let anchors: String = paths
        .iter()
        .map(|p| format!(r#"<a href="{}">{}</a>"#, p, p))
        .collect();
    format!("<html><body>{}</body></html>", anchors)
}

fn page_url(path: &str) -> String {
    format!("{}{}", SITE, path)
}

#[tokio::test]
async fn test_scenario_merges_shared_identifier() {
    let fetcher = Arc::new(
        ScriptedFetcher::default()
            .page("/", &links(&["/b", "/c"]))
            .page(
                "/b",
                r#"<html><head><script type="application/ld+json">
                   {"@type": "Organization", "name": "Acme Bakery", "telephone": "+1 555 0100"}
                   </script></head><body><a href="/d">D</a></body></html>"#,
            )
            .page(
                "/c",
                r#"<html><head><title>acme   bakery</title></head>
                   <body><a href="/">Home</a><a href="mailto:hello@acme.test">Mail</a></body></html>"#,
            )
            .page("/d", "<html><body><p>Nothing here</p></body></html>"),
    );

    let handle = start_crawl([page_url("/")], create_test_config(2, 10), fetcher.clone()).unwrap();
    let entity = handle.result().await.unwrap();

    let mut calls = fetcher.calls();
    calls.sort();
    assert_eq!(calls, vec![page_url("/"), page_url("/b"), page_url("/c"), page_url("/d")]);

    let d = entity.graph.node(&page_url("/d")).unwrap();
    assert_eq!(d.parent_url.as_deref(), Some(page_url("/b").as_str()));
    assert_eq!(d.depth, 2);
    assert!(!d.orphaned);

    assert_eq!(entity.entities.len(), 1);
    let bakery = &entity.entities[0];
    assert_eq!(bakery.pages, vec![page_url("/b"), page_url("/c")]);
    assert_eq!(bakery.value(fields::NAME), Some("Acme Bakery"));
    let sources: Vec<&str> = bakery.fields[fields::NAME]
        .sources
        .iter()
        .chain(std::iter::once(&bakery.fields[fields::NAME].provenance))
        .map(|p| p.source_url.as_str())
        .collect();
    assert!(sources.contains(&page_url("/b").as_str()));
    assert_eq!(
        bakery.fields[fields::EMAIL].provenance.source_url,
        page_url("/c")
    );

    assert_eq!(entity.contact_hints.len(), 1);
    assert!(!entity.partial);
    assert_eq!(entity.summary.termination, TerminationReason::Completed);
    assert_eq!(entity.summary.succeeded, 4);
}

#[tokio::test]
async fn test_no_url_is_fetched_twice() {
    // Every page links to every other page, plus variants of the same URL
    let all = ["/", "/a", "/b", "/c", "/a/", "/b#top", "/c?utm_source=x"];
    let fetcher = Arc::new(
        ScriptedFetcher::default()
            .page("/", &links(&all))
            .page("/a", &links(&all))
            .page("/b", &links(&all))
            .page("/c", &links(&all)),
    );

    let mut config = create_test_config(3, 50);
    config.crawler.concurrency = 4;
    let handle = start_crawl([page_url("/")], config, fetcher.clone()).unwrap();
    let entity = handle.result().await.unwrap();

    let calls = fetcher.calls();
    let unique: HashSet<&String> = calls.iter().collect();
    assert_eq!(calls.len(), unique.len());
    assert_eq!(calls.len(), 4);
    assert_eq!(entity.pages.len(), 4);
}

#[tokio::test]
async fn test_depth_limit_is_respected() {
    let fetcher = Arc::new(
        ScriptedFetcher::default()
            .page("/", &links(&["/one"]))
            .page("/one", &links(&["/two"]))
            .page("/two", &links(&["/three"])),
    );

    let handle = start_crawl([page_url("/")], create_test_config(1, 10), fetcher.clone()).unwrap();
    let entity = handle.result().await.unwrap();

    assert_eq!(fetcher.calls(), vec![page_url("/"), page_url("/one")]);
    for page in &entity.pages {
        assert!(page.depth <= 1);
        if let Some(parent) = &page.parent_url {
            let parent_depth = entity.graph.node(parent).unwrap().depth;
            assert_eq!(page.depth, parent_depth + 1);
        }
    }
}

#[tokio::test]
async fn test_single_failure_does_not_abort_crawl() {
    let page = |title: &str| format!("<html><head><title>{}</title></head></html>", title);
    let fetcher = Arc::new(
        ScriptedFetcher::default()
            .page("/", &links(&["/1", "/2", "/3", "/4"]))
            .page("/1", &page("One"))
            .page("/2", &page("Two"))
            .broken("/3")
            .page("/4", &page("Four")),
    );

    let handle = start_crawl([page_url("/")], create_test_config(2, 10), fetcher).unwrap();
    let entity = handle.result().await.unwrap();

    assert_eq!(entity.pages.len(), 4);
    let named: Vec<&str> = entity
        .pages
        .iter()
        .filter_map(|p| p.value(fields::NAME))
        .collect();
    assert_eq!(named.len(), 3);

    assert_eq!(entity.manifest.failed.len(), 1);
    let failure = &entity.manifest.failed[0];
    assert_eq!(failure.url, page_url("/3"));
    assert_eq!(failure.status, PageStatus::Failed);
    assert!(failure.reason.contains("Connection refused"));
    assert_eq!(entity.summary.failed, 1);
    assert!(!entity.partial);
}

#[tokio::test]
async fn test_cancel_keeps_only_completed_pages() {
    let slow = Duration::from_millis(400);
    let fetcher = Arc::new(
        ScriptedFetcher::default()
            .page(
                "/",
                r#"<html><head><title>Acme</title></head><body>
                   <a href="/1">1</a><a href="/2">2</a><a href="/3">3</a><a href="/4">4</a>
                   </body></html>"#,
            )
            .slow_page("/1", "<title>One</title>", slow)
            .slow_page("/2", "<title>Two</title>", slow)
            .slow_page("/3", "<title>Three</title>", slow)
            .slow_page("/4", "<title>Four</title>", slow),
    );

    let mut config = create_test_config(2, 10);
    config.crawler.concurrency = 2;
    let handle = start_crawl([page_url("/")], config, fetcher).unwrap();
    let mut events = handle.subscribe();

    loop {
        match events.recv().await.unwrap() {
            CrawlEvent::TaskCompleted { url: done, .. } if done == page_url("/") => break,
            _ => {}
        }
    }
    sumi_harvest::cancel(&handle);

    let entity = handle.result().await.unwrap();
    assert!(entity.partial);
    assert_eq!(entity.summary.termination, TerminationReason::Cancelled);
    assert_eq!(entity.pages.len(), 1);

    let provenance: Vec<&str> = entity.provenance_urls().into_iter().collect();
    assert_eq!(provenance, vec![page_url("/").as_str()]);
    assert!(!entity.manifest.dropped.is_empty() || !entity.manifest.discarded.is_empty());
}

#[tokio::test]
async fn test_per_fetch_timeout_marks_page() {
    let fetcher = Arc::new(
        ScriptedFetcher::default()
            .page("/", &links(&["/slow"]))
            .slow_page("/slow", "<title>Slow</title>", Duration::from_millis(2500)),
    );

    let mut config = create_test_config(1, 10);
    config.crawler.per_fetch_timeout_s = 1;
    let handle = start_crawl([page_url("/")], config, fetcher).unwrap();
    let mut events = handle.subscribe();
    let entity = handle.result().await.unwrap();

    assert_eq!(entity.manifest.failed.len(), 1);
    assert_eq!(entity.manifest.failed[0].status, PageStatus::Timeout);
    assert_eq!(entity.summary.timed_out, 1);

    let mut saw_timeout = false;
    while let Ok(event) = events.try_recv() {
        if let CrawlEvent::TaskCompleted {
            outcome: TaskOutcome::Timeout,
            ..
        } = event
        {
            saw_timeout = true;
        }
    }
    assert!(saw_timeout);
}

#[tokio::test]
async fn test_global_timeout_drains_in_flight_work() {
    let fetcher = Arc::new(
        ScriptedFetcher::default()
            .page("/", &links(&["/slow", "/later"]))
            .slow_page("/slow", "<title>Slow</title>", Duration::from_millis(1500))
            .slow_page("/later", "<title>Later</title>", Duration::from_millis(1500)),
    );

    let mut config = create_test_config(2, 10);
    config.crawler.concurrency = 1;
    config.crawler.global_timeout_s = Some(1);
    let handle = start_crawl([page_url("/")], config, fetcher.clone()).unwrap();
    let entity = handle.result().await.unwrap();

    assert!(entity.partial);
    assert_eq!(entity.summary.termination, TerminationReason::GlobalTimeout);
    assert!(!entity.summary.warnings.is_empty());
    // The in-flight page finished and was kept; the queued one never started
    assert!(entity.page(&page_url("/slow")).is_some());
    assert_eq!(entity.manifest.dropped, vec![page_url("/later")]);
    assert!(!fetcher.calls().contains(&page_url("/later")));
}

#[tokio::test]
async fn test_unreachable_seed_is_an_error() {
    let fetcher = Arc::new(ScriptedFetcher::default().broken("/"));
    let handle = start_crawl([page_url("/")], create_test_config(2, 10), fetcher).unwrap();

    let result = handle.result().await;
    assert!(matches!(
        result,
        Err(HarvestError::NoReachableSeed { attempted: 1 })
    ));
}

#[tokio::test]
async fn test_no_seeds_is_rejected() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    let result = start_crawl(Vec::<String>::new(), create_test_config(2, 10), fetcher);
    assert!(matches!(result, Err(HarvestError::NoSeeds)));
}

#[tokio::test]
async fn test_traversal_orders() {
    let site = || {
        ScriptedFetcher::default()
            .page("/", &links(&["/b", "/c"]))
            .page("/b", &links(&["/d"]))
            .page("/c", &links(&[]))
            .page("/d", &links(&[]))
    };

    let mut config = create_test_config(2, 10);
    config.crawler.concurrency = 1;

    let fetcher = Arc::new(site());
    let handle = start_crawl([page_url("/")], config.clone(), fetcher.clone()).unwrap();
    handle.result().await.unwrap();
    assert_eq!(
        fetcher.calls(),
        vec![page_url("/"), page_url("/b"), page_url("/c"), page_url("/d")]
    );

    config.crawler.traversal_order = TraversalOrder::DepthFirst;
    let fetcher = Arc::new(site());
    let handle = start_crawl([page_url("/")], config, fetcher.clone()).unwrap();
    handle.result().await.unwrap();
    assert_eq!(
        fetcher.calls(),
        vec![page_url("/"), page_url("/b"), page_url("/d"), page_url("/c")]
    );
}

#[tokio::test]
async fn test_page_limit() {
    let fetcher = Arc::new(
        ScriptedFetcher::default()
            .page("/", &links(&["/1", "/2", "/3"]))
            .page("/1", &links(&[]))
            .page("/2", &links(&[]))
            .page("/3", &links(&[])),
    );

    let mut config = create_test_config(2, 2);
    config.crawler.concurrency = 1;
    let handle = start_crawl([page_url("/")], config, fetcher.clone()).unwrap();
    let entity = handle.result().await.unwrap();

    assert_eq!(fetcher.calls().len(), 2);
    assert_eq!(entity.summary.termination, TerminationReason::MaxPages);
    assert_eq!(entity.manifest.dropped, vec![page_url("/2"), page_url("/3")]);
    assert!(!entity.partial);
}

#[tokio::test]
async fn test_robots_txt_disallow() {
    let fetcher = Arc::new(
        ScriptedFetcher::default()
            .page("/robots.txt", "User-agent: *\nDisallow: /private\n")
            .page("/", &links(&["/private", "/public"]))
            .page("/private", &links(&[]))
            .page("/public", &links(&[])),
    );

    let mut config = create_test_config(2, 10);
    config.crawler.respect_robots_txt = true;
    let handle = start_crawl([page_url("/")], config, fetcher.clone()).unwrap();
    let entity = handle.result().await.unwrap();

    let calls = fetcher.calls();
    assert_eq!(
        calls.iter().filter(|c| c.ends_with("/robots.txt")).count(),
        1
    );
    assert!(!calls.contains(&page_url("/private")));
    assert!(calls.contains(&page_url("/public")));

    assert_eq!(entity.manifest.failed.len(), 1);
    assert_eq!(entity.manifest.failed[0].reason, "disallowed by robots.txt");
}

#[tokio::test]
async fn test_slow_robots_txt_falls_back_to_allow_all() {
    let fetcher = Arc::new(
        ScriptedFetcher::default()
            .slow_page("/robots.txt", "User-agent: *\nDisallow: /\n", Duration::from_secs(4))
            .page("/", &links(&["/about"]))
            .page("/about", &links(&[])),
    );

    let mut config = create_test_config(2, 10);
    config.crawler.respect_robots_txt = true;
    config.crawler.per_fetch_timeout_s = 1;
    let started = Instant::now();
    let handle = start_crawl([page_url("/")], config, fetcher.clone()).unwrap();
    let entity = handle.result().await.unwrap();

    assert!(started.elapsed() < Duration::from_millis(2500));
    assert_eq!(entity.summary.termination, TerminationReason::Completed);
    assert_eq!(entity.pages.len(), 2);
    assert!(fetcher.calls().contains(&page_url("/about")));
}

#[tokio::test]
async fn test_global_deadline_interrupts_robots_lookup() {
    let fetcher = Arc::new(
        ScriptedFetcher::default()
            .slow_page("/robots.txt", "User-agent: *\n", Duration::from_secs(4))
            .page("/", &links(&[])),
    );

    let mut config = create_test_config(2, 10);
    config.crawler.respect_robots_txt = true;
    config.crawler.per_fetch_timeout_s = 3;
    config.crawler.global_timeout_s = Some(1);
    let started = Instant::now();
    let handle = start_crawl([page_url("/")], config, fetcher.clone()).unwrap();

    // Cut short before any seed was fetched: partial, not an error
    let entity = handle.result().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(entity.partial);
    assert_eq!(entity.summary.termination, TerminationReason::GlobalTimeout);
    assert_eq!(entity.manifest.dropped, vec![page_url("/")]);
    assert!(entity.pages.is_empty());
    assert!(!fetcher.calls().contains(&page_url("/")));
}

#[tokio::test]
async fn test_redirect_target_is_not_fetched_again() {
    let fetcher = Arc::new(
        ScriptedFetcher::default()
            .page("/", &links(&["/a", "/b"]))
            .redirect("/a", "/b")
            .page("/b", "<html><head><title>Acme</title></head></html>"),
    );

    let mut config = create_test_config(2, 10);
    config.crawler.concurrency = 1;
    let handle = start_crawl([page_url("/")], config, fetcher.clone()).unwrap();
    let entity = handle.result().await.unwrap();

    assert_eq!(fetcher.calls(), vec![page_url("/"), page_url("/a")]);
    let landed: Vec<&str> = entity.pages.iter().map(|p| p.final_url.as_str()).collect();
    assert_eq!(landed, vec![page_url("/").as_str(), page_url("/b").as_str()]);
    assert!(entity.manifest.duplicates.is_empty());
}

#[tokio::test]
async fn test_redirect_onto_fetched_page_is_a_duplicate() {
    let fetcher = Arc::new(
        ScriptedFetcher::default()
            .page("/", &links(&["/b", "/a"]))
            .redirect("/a", "/b")
            .page("/b", "<html><head><title>Acme</title></head></html>"),
    );

    let mut config = create_test_config(2, 10);
    config.crawler.concurrency = 1;
    let handle = start_crawl([page_url("/")], config, fetcher.clone()).unwrap();
    let mut events = handle.subscribe();
    let entity = handle.result().await.unwrap();

    assert_eq!(
        fetcher.calls(),
        vec![page_url("/"), page_url("/b"), page_url("/a")]
    );
    let mut landed: Vec<&str> = entity.pages.iter().map(|p| p.final_url.as_str()).collect();
    landed.sort();
    landed.dedup();
    assert_eq!(landed.len(), entity.pages.len());
    assert!(entity.page(&page_url("/a")).is_none());

    assert_eq!(
        entity.manifest.duplicates,
        vec![DuplicatePage {
            url: page_url("/a"),
            final_url: page_url("/b"),
        }]
    );
    assert_eq!(entity.summary.duplicates, 1);
    assert_eq!(entity.summary.succeeded, 2);

    let mut saw_duplicate = false;
    while let Ok(event) = events.try_recv() {
        if let CrawlEvent::TaskCompleted {
            outcome: TaskOutcome::Duplicate { final_url },
            ..
        } = event
        {
            assert_eq!(final_url, page_url("/b"));
            saw_duplicate = true;
        }
    }
    assert!(saw_duplicate);
}

#[tokio::test]
async fn test_retry_after_spaces_next_request() {
    let fetcher = Arc::new(
        ScriptedFetcher::default()
            .page("/", &links(&["/busy", "/next"]))
            .status("/busy", 503, Some(Duration::from_millis(600)))
            .page("/next", &links(&[])),
    );

    let mut config = create_test_config(2, 10);
    config.crawler.concurrency = 1;
    let handle = start_crawl([page_url("/")], config, fetcher.clone()).unwrap();
    let entity = handle.result().await.unwrap();

    let gap = fetcher.call_time("/next") - fetcher.call_time("/busy");
    assert!(gap >= Duration::from_millis(600), "gap was {:?}", gap);
    assert_eq!(entity.manifest.failed[0].http_status, Some(503));
}

#[tokio::test]
async fn test_retry_after_on_success_spaces_next_request() {
    let fetcher = Arc::new(
        ScriptedFetcher::default()
            .paced_page("/", &links(&["/next"]), Duration::from_millis(500))
            .page("/next", &links(&[])),
    );

    let handle = start_crawl([page_url("/")], create_test_config(2, 10), fetcher.clone()).unwrap();
    let entity = handle.result().await.unwrap();

    let gap = fetcher.call_time("/next") - fetcher.call_time("/");
    assert!(gap >= Duration::from_millis(500), "gap was {:?}", gap);
    assert_eq!(entity.pages.len(), 2);
}

#[tokio::test]
async fn test_progress_reports_running_crawl() {
    let fetcher = Arc::new(
        ScriptedFetcher::default()
            .page("/", &links(&["/slow"]))
            .slow_page("/slow", &links(&[]), Duration::from_millis(500)),
    );

    let mut config = create_test_config(2, 10);
    config.crawler.concurrency = 1;
    let handle = start_crawl([page_url("/")], config, fetcher).unwrap();
    let mut events = handle.subscribe();

    let initial = handle.progress();
    assert_eq!(initial.queued + initial.in_flight, 1);

    loop {
        match events.recv().await.unwrap() {
            CrawlEvent::TaskStarted { url, .. } if url == page_url("/slow") => break,
            _ => {}
        }
    }

    let progress = handle.progress();
    assert_eq!(progress.in_flight, 1);
    assert_eq!(progress.completed, 1);
    assert_eq!(progress.queued, 0);
    assert_eq!(progress.discovered_total, 1);

    handle.result().await.unwrap();
}

#[tokio::test]
async fn test_try_result_before_and_after_finish() {
    let fetcher = Arc::new(
        ScriptedFetcher::default()
            .slow_page("/", &links(&[]), Duration::from_millis(200)),
    );

    let mut handle = start_crawl([page_url("/")], create_test_config(2, 10), fetcher).unwrap();
    assert!(handle.try_result().is_none());

    let entity = loop {
        if let Some(result) = handle.try_result() {
            break result.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    };
    assert_eq!(entity.pages.len(), 1);

    // Handed out once
    assert!(matches!(handle.try_result(), Some(Err(_))));
    assert_eq!(handle.progress().completed, 1);
}

// ===== reqwest fetcher against a mock server =====

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/html")
}

fn http_fetcher() -> HttpFetcher {
    let config = create_test_config(2, 10);
    HttpFetcher::from_config(&config.user_agent, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_http_fetcher_reads_html() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<html><title>Acme</title></html>"))
        .mount(&mock_server)
        .await;

    let target = Url::parse(&mock_server.uri()).unwrap();
    let response = http_fetcher().fetch(&target).await.unwrap();

    assert_eq!(response.status_code, 200);
    assert!(response.content.unwrap().contains("Acme"));
}

#[tokio::test]
async fn test_http_fetcher_reports_status_and_retry_hint() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
        .mount(&mock_server)
        .await;

    let target = Url::parse(&format!("{}/busy", mock_server.uri())).unwrap();
    let error = http_fetcher().fetch(&target).await.unwrap_err();

    assert!(matches!(error, FetchError::Http { status: 429, .. }));
    assert_eq!(error.retry_after(), Some(Duration::from_secs(7)));

    let missing = Url::parse(&format!("{}/missing", mock_server.uri())).unwrap();
    let error = http_fetcher().fetch(&missing).await.unwrap_err();
    assert!(matches!(error, FetchError::Http { status: 404, .. }));
}

#[tokio::test]
async fn test_http_fetcher_rejects_non_html() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/brochure"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(b"%PDF-1.4".to_vec(), "application/pdf"),
        )
        .mount(&mock_server)
        .await;

    let target = Url::parse(&format!("{}/brochure", mock_server.uri())).unwrap();
    let error = http_fetcher().fetch(&target).await.unwrap_err();
    assert!(matches!(error, FetchError::ContentMismatch { .. }));
}

#[tokio::test]
async fn test_http_fetcher_follows_redirects() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(
            ResponseTemplate::new(301).insert_header("location", format!("{}/new", mock_server.uri()).as_str()),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(html("<html><title>New</title></html>"))
        .mount(&mock_server)
        .await;

    let target = Url::parse(&format!("{}/old", mock_server.uri())).unwrap();
    let response = http_fetcher().fetch(&target).await.unwrap();
    assert!(response.final_url.ends_with("/new"));
}

#[tokio::test]
async fn test_full_crawl_over_http() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /admin\n"))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<html><head><title>Home | Acme Corp</title></head><body>
               <a href="/about/">About</a>
               <a href="/admin">Admin</a>
               <a href="https://elsewhere.example/">Elsewhere</a>
               </body></html>"#,
        ))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/about"))
        .respond_with(html(
            r#"<html><head><script type="application/ld+json">
               {"@type": "Corporation", "name": "Acme Corp", "email": "info@acme.example",
                "address": {"streetAddress": "1 Main St", "addressLocality": "Springfield"}}
               </script></head><body></body></html>"#,
        ))
        .mount(&mock_server)
        .await;

    let mut config = create_test_config(2, 10);
    config.crawler.respect_robots_txt = true;
    let handle = start_crawl([mock_server.uri()], config, Arc::new(http_fetcher())).unwrap();
    let entity = handle.result().await.unwrap();

    assert_eq!(entity.pages.len(), 2);
    assert_eq!(entity.flattened().get(fields::NAME), Some(&"Acme Corp"));
    let email = entity.field(fields::EMAIL).unwrap();
    assert_eq!(email.strategy.name, "structured-data");
    assert!(email.provenance.source_url.ends_with("/about"));
    assert_eq!(
        entity.field(fields::ADDRESS).unwrap().value,
        "1 Main St, Springfield"
    );

    assert_eq!(entity.manifest.failed.len(), 1);
    assert!(entity.manifest.failed[0].url.ends_with("/admin"));
    assert_eq!(entity.entities.len(), 1);
}

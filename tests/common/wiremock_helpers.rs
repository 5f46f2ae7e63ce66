use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use companyfinder::config::AppConfig;

/// The marker the search engine puts on its captcha interstitial.
pub const CAPTCHA_PAGE: &str = "<html><body>Our systems have detected unusual traffic from your computer network. \
Please try your request again later.</body></html>";

/// Default config pointed at mock servers.
///
/// `search` serves `/search`, the registry and homepages; `maps` serves the places API.
pub fn mock_config(search: &MockServer) -> AppConfig {
    let mut config = AppConfig::default_template().expect("default config should parse");
    config.search.search_url = search.uri();
    config.registry.search_url = search.uri();
    config.homepage.url_template = format!("{}/sites/{{domain}}/", search.uri());
    config.homepage.timeout_secs = 1;
    config.maps.api_url = search.uri();
    config.maps.not_ready_delay_ms = 10;
    config.maps.page_delay_ms = 10;
    config.http.request_timeout_secs = 5;
    config
}

/// The same server addressed as `localhost`, so search result links are not
/// filtered out as the search engine's own host.
pub fn localhost_base(server: &MockServer) -> String {
    format!("http://localhost:{}", server.address().port())
}

/// A search results page whose links go through the engine's `/url?q=` redirector.
pub fn search_results_html(links: &[String]) -> String {
    let anchors: String = links
        .iter()
        .map(|link| format!("<div class=\"g\"><a href=\"/url?q={}&amp;sa=U\">{}</a></div>\n", link, link))
        .collect();
    format!("<html><body><div id=\"search\">\n{}</div></body></html>", anchors)
}

/// Serve a results page for one exact query.
pub async fn mock_search(server: &MockServer, query: &str, links: &[String]) {
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", query))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(search_results_html(links))
                .insert_header("content-type", "text/html; charset=utf-8"),
        )
        .mount(server)
        .await;
}

/// Answer every search with the captcha page.
pub async fn mock_captcha(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string(CAPTCHA_PAGE))
        .mount(server)
        .await;
}

/// Serves HTML content at the specified path.
pub async fn mock_page(server: &MockServer, url_path: &str, html: &str) {
    Mock::given(method("GET"))
        .and(path(url_path))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(html.to_string())
                .insert_header("content-type", "text/html; charset=utf-8"),
        )
        .mount(server)
        .await;
}

/// Delays the response at `url_path` to simulate a site that never answers in time.
pub async fn mock_slow_page(server: &MockServer, url_path: &str, delay_ms: u64) {
    Mock::given(method("GET"))
        .and(path(url_path))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><head><title>Too late</title></head></html>")
                .set_delay(Duration::from_millis(delay_ms)),
        )
        .mount(server)
        .await;
}

/// Returns the specified HTTP status code at `url_path`.
pub async fn mock_status(server: &MockServer, url_path: &str, status_code: u16) {
    Mock::given(method("GET"))
        .and(path(url_path))
        .respond_with(ResponseTemplate::new(status_code))
        .mount(server)
        .await;
}

/// Serves a JSON body for a places API endpoint.
pub fn json_response(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), "application/json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_search_serves_redirect_links() {
        let server = MockServer::start().await;
        mock_search(&server, "site:acme.com", &["http://localhost:1/about".to_string()]).await;

        let body = reqwest::Client::new()
            .get(format!("{}/search", server.uri()))
            .query(&[("q", "site:acme.com")])
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();

        assert!(body.contains("/url?q=http://localhost:1/about"));
    }

    #[tokio::test]
    async fn test_mock_status_returns_status_code() {
        let server = MockServer::start().await;
        mock_status(&server, "/gone", 503).await;

        let response = reqwest::Client::new()
            .get(format!("{}/gone", server.uri()))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 503);
    }
}

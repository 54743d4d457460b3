//! Integration tests for manifest resolution over HTTP.

mod support;

use std::time::Duration;

use anidl_core::download::{HttpClient, RetryPolicy};
use anidl_core::manifest::{ManifestError, ManifestResolver};
use support::mount_media;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn resolver() -> ManifestResolver {
    ManifestResolver::new(
        HttpClient::new(),
        RetryPolicy::fixed(3, Duration::from_millis(10)),
        Some(Duration::from_secs(5)),
    )
}

async fn mount_master(server: &MockServer) {
    let master = "#EXTM3U\n\
        #EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360\n\
        360/index.m3u8\n\
        #EXT-X-STREAM-INF:BANDWIDTH=2000000,RESOLUTION=1280x720\n\
        720/index.m3u8\n\
        #EXT-X-STREAM-INF:BANDWIDTH=5000000,RESOLUTION=1920x1080\n\
        1080/index.m3u8\n";
    Mock::given(method("GET"))
        .and(path("/show/master.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_string(master))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_master_defaults_to_highest_bandwidth_variant() {
    let server = MockServer::start().await;
    mount_master(&server).await;
    mount_media(&server, "/show/1080/index.m3u8", 4).await;

    let playlist = resolver()
        .resolve(&format!("{}/show/master.m3u8", server.uri()), None, None)
        .await
        .unwrap();

    let variant = playlist.variant.expect("master playlist has a variant");
    assert_eq!(variant.resolution_label, "1920x1080");
    assert_eq!(variant.bandwidth, 5_000_000);
    assert_eq!(playlist.segment_urls.len(), 4);
    assert_eq!(
        playlist.segment_urls[0],
        format!("{}/show/1080/seg-0.ts", server.uri())
    );
    assert_eq!(
        playlist.segment_urls[3],
        format!("{}/show/1080/seg-3.ts", server.uri())
    );
}

#[tokio::test]
async fn test_resolution_keyword_picks_matching_variant() {
    let server = MockServer::start().await;
    mount_master(&server).await;
    mount_media(&server, "/show/720/index.m3u8", 2).await;

    let playlist = resolver()
        .resolve(
            &format!("{}/show/master.m3u8", server.uri()),
            None,
            Some("720"),
        )
        .await
        .unwrap();

    assert_eq!(
        playlist.variant.map(|v| v.resolution_label),
        Some("1280x720".to_string())
    );
    assert_eq!(
        playlist.base_url,
        format!("{}/show/720/index.m3u8", server.uri())
    );
}

#[tokio::test]
async fn test_referer_is_sent_on_playlist_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/media.m3u8"))
        .and(header("referer", "https://player.example/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "#EXTM3U\n#EXTINF:4,\na.ts\n#EXT-X-ENDLIST\n",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let playlist = resolver()
        .resolve(
            &format!("{}/media.m3u8", server.uri()),
            Some("https://player.example/"),
            None,
        )
        .await
        .unwrap();
    assert!(playlist.variant.is_none());
    assert_eq!(playlist.segment_urls, vec![format!("{}/a.ts", server.uri())]);
}

#[tokio::test]
async fn test_media_playlist_without_segments_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/empty.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_string("#EXTM3U\n#EXT-X-ENDLIST\n"))
        .mount(&server)
        .await;

    let err = resolver()
        .resolve(&format!("{}/empty.m3u8", server.uri()), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ManifestError::EmptyPlaylist { .. }));
}

#[tokio::test]
async fn test_missing_master_is_a_fetch_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone.m3u8"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let err = resolver()
        .resolve(&format!("{}/gone.m3u8", server.uri()), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ManifestError::Fetch { attempts: 1, .. }));
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky.m3u8"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "#EXTM3U\n#EXTINF:4,\nx.ts\n#EXT-X-ENDLIST\n",
        ))
        .mount(&server)
        .await;

    let playlist = resolver()
        .resolve(&format!("{}/flaky.m3u8", server.uri()), None, None)
        .await
        .unwrap();
    assert_eq!(playlist.segment_urls.len(), 1);
}

#[tokio::test]
async fn test_unparseable_url_is_rejected() {
    let err = resolver().resolve("not a url", None, None).await.unwrap_err();
    assert!(matches!(err, ManifestError::InvalidUrl { .. }));
}

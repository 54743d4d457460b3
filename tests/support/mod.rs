//! Shared helpers for integration tests: catalog mocks, flaky responders,
//! and a multiplexer fake that concatenates segments in list order.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anidl_core::{AssembleError, EpisodeMetadata, Multiplexer};
use async_trait::async_trait;
use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Respond, ResponseTemplate};

/// Wraps `data` in the catalog success envelope.
pub fn envelope(data: Value) -> Value {
    json!({ "success": true, "data": data })
}

/// Mounts `/anime/<id>` and `/anime/<id>/episodes` for `count` episodes
/// titled `Title <n>`, each with stream id `<id>?ep=<n>`.
pub async fn mount_anime(server: &MockServer, id: &str, title: &str, count: u32) {
    Mock::given(method("GET"))
        .and(path(format!("/anime/{id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({
            "anime": { "info": { "id": id, "name": title } }
        }))))
        .mount(server)
        .await;

    let episodes: Vec<Value> = (1..=count)
        .map(|n| {
            json!({
                "number": n,
                "title": format!("Title {n}"),
                "episodeId": format!("{id}?ep={n}")
            })
        })
        .collect();
    Mock::given(method("GET"))
        .and(path(format!("/anime/{id}/episodes")))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({
            "totalEpisodes": count,
            "episodes": episodes
        }))))
        .mount(server)
        .await;
}

/// Mounts the server list for one episode.
pub async fn mount_servers(server: &MockServer, episode_id: &str, sub: &[&str], dub: &[&str]) {
    let list = |names: &[&str]| -> Vec<Value> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| json!({ "serverName": name, "serverId": i + 1 }))
            .collect()
    };
    Mock::given(method("GET"))
        .and(path("/episode/servers"))
        .and(query_param("animeEpisodeId", episode_id))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({
            "sub": list(sub),
            "dub": list(dub),
            "raw": []
        }))))
        .mount(server)
        .await;
}

/// Source payload `data` for an HLS stream with optional referer and tracks.
pub fn hls_source(url: &str, referer: Option<&str>, tracks: Value) -> Value {
    let mut data = json!({
        "sources": [{ "url": url, "isM3U8": true, "type": "hls" }],
        "tracks": tracks
    });
    if let Some(referer) = referer {
        data["headers"] = json!({ "Referer": referer });
    }
    data
}

/// Mounts the source payload for one episode/server/category.
pub async fn mount_source(
    server: &MockServer,
    episode_id: &str,
    server_name: &str,
    category: &str,
    data: Value,
) {
    Mock::given(method("GET"))
        .and(path("/episode/sources"))
        .and(query_param("animeEpisodeId", episode_id))
        .and(query_param("server", server_name))
        .and(query_param("category", category))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(data)))
        .mount(server)
        .await;
}

/// Mounts a media playlist at `playlist_path` listing `count` segments named
/// `seg-<i>.ts` (relative), and the segments themselves with body `s<i>;`.
pub async fn mount_media(server: &MockServer, playlist_path: &str, count: usize) {
    let mut playlist = String::from("#EXTM3U\n#EXT-X-TARGETDURATION:4\n");
    for i in 0..count {
        playlist.push_str(&format!("#EXTINF:4.0,\nseg-{i}.ts\n"));
    }
    playlist.push_str("#EXT-X-ENDLIST\n");
    Mock::given(method("GET"))
        .and(path(playlist_path))
        .respond_with(ResponseTemplate::new(200).set_body_string(playlist))
        .mount(server)
        .await;

    let dir = playlist_path.rsplit_once('/').map_or("", |(d, _)| d);
    for i in 0..count {
        Mock::given(method("GET"))
            .and(path(format!("{dir}/seg-{i}.ts")))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!("s{i};")))
            .mount(server)
            .await;
    }
}

/// Expected concatenation of `count` segments from [`mount_media`].
pub fn expected_segments(count: usize) -> String {
    (0..count).map(|i| format!("s{i};")).collect()
}

/// Responder that answers the first `fail_count` requests with `fail`, then
/// with `success`.
pub struct FlakyResponder {
    pub request_count: Arc<AtomicUsize>,
    pub fail_count: usize,
    pub fail: ResponseTemplate,
    pub success: ResponseTemplate,
}

impl FlakyResponder {
    pub fn new(fail_count: usize, fail: ResponseTemplate, success: ResponseTemplate) -> Self {
        Self {
            request_count: Arc::new(AtomicUsize::new(0)),
            fail_count,
            fail,
            success,
        }
    }
}

impl Respond for FlakyResponder {
    fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
        let n = self.request_count.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_count {
            self.fail.clone()
        } else {
            self.success.clone()
        }
    }
}

/// Multiplexer fake: concatenates the listed files into the output and
/// counts invocations.
#[derive(Default)]
pub struct ConcatMultiplexer {
    pub calls: AtomicUsize,
}

impl ConcatMultiplexer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Multiplexer for ConcatMultiplexer {
    async fn concat(
        &self,
        list_file: &Path,
        output: &Path,
        _metadata: &EpisodeMetadata,
    ) -> Result<(), AssembleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let list = std::fs::read_to_string(list_file).map_err(|e| AssembleError::io(list_file, e))?;
        let dir = list_file.parent().unwrap_or(Path::new("."));
        let mut joined = Vec::new();
        for line in list.lines() {
            let name = line.trim_start_matches("file '").trim_end_matches('\'');
            let path = dir.join(name);
            let bytes = std::fs::read(&path).map_err(|e| AssembleError::io(&path, e))?;
            joined.extend(bytes);
        }
        std::fs::write(output, joined).map_err(|e| AssembleError::io(output, e))
    }
}

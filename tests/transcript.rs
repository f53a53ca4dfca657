use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use transcript_server::opts::ServerOpts;
use transcript_server::server::{self, ServerContext};
use transcript_server::{AudioSource, Engine, EngineError, ModelManager, Payload, TranscribeOpts};

#[derive(Debug, Clone, PartialEq)]
struct Call {
    source: AudioSource,
    grammar: Option<Vec<String>>,
}

#[derive(Clone, Default)]
struct FakeEngine {
    calls: Arc<Mutex<Vec<Call>>>,
    fail_with: Option<String>,
    panic_with: Option<String>,
}

impl FakeEngine {
    fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_owned()),
            ..Default::default()
        }
    }

    fn panicking(message: &str) -> Self {
        Self {
            panic_with: Some(message.to_owned()),
            ..Default::default()
        }
    }

    fn record(&self, source: AudioSource, opts: &TranscribeOpts) -> Result<Payload, EngineError> {
        self.calls
            .lock()
            .expect("calls lock poisoned")
            .push(Call {
                source,
                grammar: opts.grammar.clone(),
            });

        if let Some(message) = &self.panic_with {
            panic!("{message}");
        }
        if let Some(message) = &self.fail_with {
            return Err(EngineError::msg(message.clone()));
        }

        let mut payload = Payload::new();
        payload.insert("text".into(), json!("hello world"));
        Ok(payload)
    }
}

impl Engine for FakeEngine {
    type Model = String;

    fn load(&self, dir: &Path) -> Result<String, EngineError> {
        Ok(dir.display().to_string())
    }

    fn transcribe_file(
        &self,
        path: &Path,
        _model: &String,
        opts: &TranscribeOpts,
    ) -> Result<Payload, EngineError> {
        self.record(AudioSource::File(path.to_path_buf()), opts)
    }

    fn transcribe_buffer(
        &self,
        bytes: &[u8],
        _model: &String,
        opts: &TranscribeOpts,
    ) -> Result<Payload, EngineError> {
        self.record(AudioSource::Buffer(bytes.to_vec()), opts)
    }
}

struct Harness {
    app: Router,
    ctx: Arc<ServerContext<FakeEngine>>,
    calls: Arc<Mutex<Vec<Call>>>,
    _root: tempfile::TempDir,
}

impl Harness {
    fn new(engine: FakeEngine) -> anyhow::Result<Self> {
        Self::with_opts(engine, ServerOpts::default())
    }

    fn with_opts(engine: FakeEngine, opts: ServerOpts) -> anyhow::Result<Self> {
        let root = tempfile::tempdir()?;
        let dir = root.path().join("small-en");
        std::fs::create_dir(&dir)?;

        let calls = engine.calls.clone();
        let models = ModelManager::load(engine, &dir)?;
        let ctx = Arc::new(ServerContext::new(models, opts)?);

        Ok(Self {
            app: server::router(ctx.clone()),
            ctx,
            calls,
            _root: root,
        })
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls lock poisoned").clone()
    }

    async fn send(&self, req: Request<Body>) -> anyhow::Result<(StatusCode, Value)> {
        let res = self.app.clone().oneshot(req).await?;
        let status = res.status();

        let content_type = res
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        assert!(
            content_type.starts_with("application/json"),
            "unexpected content type {content_type:?}"
        );

        let bytes = axum::body::to_bytes(res.into_body(), 1024 * 1024).await?;
        Ok((status, serde_json::from_slice(&bytes)?))
    }

    async fn get(&self, uri: &str) -> anyhow::Result<(StatusCode, Value)> {
        self.send(Request::builder().uri(uri).body(Body::empty())?)
            .await
    }

    async fn get_owned(&self, uri: String) -> anyhow::Result<(StatusCode, Value)> {
        self.get(&uri).await
    }

    async fn post(&self, uri: &str, body: Body) -> anyhow::Result<(StatusCode, Value)> {
        self.send(
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .body(body)?,
        )
        .await
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

fn chunked(chunks: &[&'static [u8]]) -> Body {
    Body::from_stream(futures_util::stream::iter(
        chunks
            .iter()
            .map(|c| Ok::<Bytes, std::io::Error>(Bytes::from_static(*c)))
            .collect::<Vec<_>>(),
    ))
}

#[tokio::test]
async fn get_with_speech_transcribes_the_file() -> anyhow::Result<()> {
    let h = Harness::new(FakeEngine::default())?;

    let (status, body) = h.get("/transcript?speech=sample.wav").await?;

    assert_eq!(status, StatusCode::OK);
    assert!(body.get("id").is_some());
    assert!(body["latency"].is_u64());
    assert_eq!(body["text"], "hello world");
    assert_eq!(
        h.calls(),
        vec![Call {
            source: AudioSource::File(PathBuf::from("sample.wav")),
            grammar: None,
        }]
    );
    Ok(())
}

#[tokio::test]
async fn get_without_speech_is_rejected_before_the_engine() -> anyhow::Result<()> {
    let h = Harness::new(FakeEngine::default())?;

    for uri in ["/transcript", "/transcript?model=small-en", "/transcript?speech="] {
        let (status, body) = h.get(uri).await?;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{uri}");
        assert!(!body["error"].as_str().unwrap_or_default().is_empty());
    }

    assert!(h.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn get_with_other_model_is_not_found() -> anyhow::Result<()> {
    let h = Harness::new(FakeEngine::default())?;

    let (status, body) = h.get("/transcript?speech=a.wav&model=wrong").await?;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap_or_default().contains("wrong"));
    assert!(h.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn get_with_loaded_model_name_is_accepted() -> anyhow::Result<()> {
    let h = Harness::new(FakeEngine::default())?;

    let (status, _) = h.get("/transcript?speech=a.wav&model=small-en").await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.calls().len(), 1);
    Ok(())
}

#[tokio::test]
async fn post_with_other_model_is_not_found() -> anyhow::Result<()> {
    let h = Harness::new(FakeEngine::default())?;

    let (status, _) = h
        .post("/transcript?model=wrong", chunked(&[b"RIFF"]))
        .await?;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(h.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn post_body_chunks_reach_the_engine_concatenated() -> anyhow::Result<()> {
    let h = Harness::new(FakeEngine::default())?;

    let (status, body) = h
        .post(
            "/transcript?speech=ignored.wav",
            chunked(&[&[0x52, 0x49], &[0x46, 0x46]]),
        )
        .await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["text"], "hello world");
    assert_eq!(
        h.calls(),
        vec![Call {
            source: AudioSource::Buffer(vec![0x52, 0x49, 0x46, 0x46]),
            grammar: None,
        }]
    );
    Ok(())
}

#[tokio::test]
async fn post_with_loaded_model_name_is_accepted() -> anyhow::Result<()> {
    let h = Harness::new(FakeEngine::default())?;

    let (status, body) = h
        .post("/transcript?model=small-en", chunked(&[b"RIFF"]))
        .await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["text"], "hello world");
    assert_eq!(
        h.calls(),
        vec![Call {
            source: AudioSource::Buffer(b"RIFF".to_vec()),
            grammar: None,
        }]
    );
    Ok(())
}

#[tokio::test]
async fn post_grammar_is_forwarded_with_the_buffer() -> anyhow::Result<()> {
    let h = Harness::new(FakeEngine::default())?;

    let (status, _) = h
        .post(
            "/transcript?grammar=%5B%22turn%20on%22%2C%22turn%20off%22%2C%22%5Bunk%5D%22%5D",
            chunked(&[b"RI", b"FF"]),
        )
        .await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        h.calls(),
        vec![Call {
            source: AudioSource::Buffer(b"RIFF".to_vec()),
            grammar: Some(vec![
                "turn on".to_owned(),
                "turn off".to_owned(),
                "[unk]".to_owned(),
            ]),
        }]
    );
    Ok(())
}

#[tokio::test]
async fn empty_post_body_reaches_the_engine_as_empty_buffer() -> anyhow::Result<()> {
    let h = Harness::new(FakeEngine::default())?;

    let (status, _) = h.post("/transcript", Body::empty()).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = h.post("/transcript", chunked(&[b"", b""])).await?;
    assert_eq!(status, StatusCode::OK);

    let empty = Call {
        source: AudioSource::Buffer(Vec::new()),
        grammar: None,
    };
    assert_eq!(h.calls(), vec![empty.clone(), empty]);
    Ok(())
}

#[tokio::test]
async fn post_body_over_limit_is_rejected() -> anyhow::Result<()> {
    let opts = ServerOpts {
        max_body_bytes: Some(3),
        ..ServerOpts::default()
    };
    let h = Harness::with_opts(FakeEngine::default(), opts)?;

    let (status, body) = h.post("/transcript", chunked(&[b"RI", b"FF"])).await?;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body["error"].as_str().unwrap_or_default().contains('3'));
    assert!(h.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn client_id_is_echoed_verbatim() -> anyhow::Result<()> {
    let h = Harness::new(FakeEngine::default())?;

    let (_, body) = h.get("/transcript?speech=a.wav&id=req%2042").await?;
    assert_eq!(body["id"], "req 42");

    let (_, body) = h
        .post("/transcript?id=0017", chunked(&[b"RIFF"]))
        .await?;
    assert_eq!(body["id"], "0017");
    Ok(())
}

#[tokio::test]
async fn missing_id_defaults_to_arrival_time() -> anyhow::Result<()> {
    let h = Harness::new(FakeEngine::default())?;

    let before = now_millis();
    let (status, body) = h.get("/transcript?speech=a.wav").await?;
    let after = now_millis();

    assert_eq!(status, StatusCode::OK);
    let id = body["id"].as_u64().expect("default id must be numeric");
    assert!(before <= id && id <= after, "{before} <= {id} <= {after}");
    Ok(())
}

#[tokio::test]
async fn grammar_is_forwarded_in_order() -> anyhow::Result<()> {
    let h = Harness::new(FakeEngine::default())?;

    let (status, _) = h
        .get("/transcript?speech=a.wav&grammar=%5B%22yes%22%2C%22no%22%5D")
        .await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        h.calls()[0].grammar,
        Some(vec!["yes".to_owned(), "no".to_owned()])
    );
    Ok(())
}

#[tokio::test]
async fn malformed_grammar_is_unsupported_media() -> anyhow::Result<()> {
    let h = Harness::new(FakeEngine::default())?;

    let (status, body) = h
        .get("/transcript?speech=a.wav&grammar=%5Byes")
        .await?;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(
        body["error"]
            .as_str()
            .unwrap_or_default()
            .contains("invalid grammar")
    );

    let (status, _) = h
        .post("/transcript?grammar=nope", chunked(&[b"RIFF"]))
        .await?;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

    // The server keeps serving afterwards.
    let (status, _) = h.get("/transcript?speech=a.wav").await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn engine_failures_are_unsupported_media() -> anyhow::Result<()> {
    let h = Harness::new(FakeEngine::failing("expected mono WAV"))?;

    let (status, body) = h.get("/transcript?speech=stereo.wav").await?;

    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body, json!({"error": "expected mono WAV"}));
    Ok(())
}

#[tokio::test]
async fn engine_panics_fail_only_that_request() -> anyhow::Result<()> {
    let h = Harness::new(FakeEngine::panicking("decoder state corrupted"))?;

    let (status, body) = h.get("/transcript?speech=a.wav").await?;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(
        body["error"]
            .as_str()
            .unwrap_or_default()
            .starts_with("engine task failed")
    );

    let (status, _) = h.post("/transcript", chunked(&[b"RIFF"])).await?;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

    assert_eq!(h.calls().len(), 2);
    assert_eq!(h.ctx.active_transcriptions(), 0);
    assert!(h.ctx.models().is_loaded());
    Ok(())
}

#[tokio::test]
async fn paths_under_the_transcript_prefix_are_served() -> anyhow::Result<()> {
    let h = Harness::new(FakeEngine::default())?;

    for uri in [
        "/transcript/?speech=a.wav",
        "/transcript/x?speech=a.wav",
        "/transcripts?speech=a.wav",
    ] {
        let (status, body) = h.get(uri).await?;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(body["text"], "hello world");
    }

    let (status, _) = h
        .post("/transcript/upload", chunked(&[b"RIFF"]))
        .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = h.get("/transcript/x").await?;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let (status, _) = h.get("/transcript/x?speech=a.wav&model=wrong").await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert_eq!(h.calls().len(), 4);
    Ok(())
}

#[tokio::test]
async fn other_paths_are_method_not_allowed() -> anyhow::Result<()> {
    let h = Harness::new(FakeEngine::default())?;

    for uri in ["/", "/v1/transcript?speech=a.wav", "/health", "/Transcript?speech=a.wav"] {
        let (status, body) = h.get(uri).await?;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{uri}");
        assert!(body["error"].is_string());
    }

    let (status, _) = h.post("/other", chunked(&[b"RIFF"])).await?;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert!(h.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn other_methods_are_method_not_allowed() -> anyhow::Result<()> {
    let h = Harness::new(FakeEngine::default())?;

    for method in [Method::PUT, Method::DELETE, Method::PATCH, Method::HEAD] {
        for uri in ["/transcript?speech=a.wav", "/transcript/x?speech=a.wav"] {
            let res = h
                .app
                .clone()
                .oneshot(
                    Request::builder()
                        .method(method.clone())
                        .uri(uri)
                        .body(Body::empty())?,
                )
                .await?;
            assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED, "{method} {uri}");
        }
    }

    assert!(h.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn active_counter_returns_to_zero_after_concurrent_requests() -> anyhow::Result<()> {
    let h = Harness::new(FakeEngine::default())?;

    let requests = (0..16).map(|i| {
        let uri = match i % 4 {
            0 => "/transcript?speech=a.wav".to_owned(),
            1 => "/transcript?speech=a.wav&model=wrong".to_owned(),
            2 => "/transcript?speech=a.wav&grammar=%5B".to_owned(),
            _ => format!("/transcript?speech=a.wav&id={i}"),
        };
        h.get_owned(uri)
    });
    let results = futures_util::future::join_all(requests).await;

    let mut ok = 0;
    for res in results {
        if res?.0 == StatusCode::OK {
            ok += 1;
        }
    }

    assert_eq!(ok, 8);
    assert_eq!(h.ctx.active_transcriptions(), 0);
    Ok(())
}

#[tokio::test]
async fn released_model_fails_requests_without_crashing() -> anyhow::Result<()> {
    let h = Harness::new(FakeEngine::default())?;
    assert!(h.ctx.models().release());

    let (status, body) = h.get("/transcript?speech=a.wav").await?;

    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(body["error"].as_str().unwrap_or_default().contains("released"));
    assert!(h.calls().is_empty());
    Ok(())
}

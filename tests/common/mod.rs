#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use axum::async_trait;
use axum::Router;
use tokio::net::TcpListener;

use ocr_gateway::{GenerationConfig, ModelLoader, OcrEngine, PromptInput, RequestOutput};

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

#[derive(Clone, Debug)]
pub enum Reply {
    Text(String),
    Fail(String),
    Empty,
    Slow(Duration),
}

#[derive(Clone, Debug)]
pub struct GenerateCall {
    pub inputs: Vec<PromptInput>,
    pub config: GenerationConfig,
}

/// Shared record of everything the stub loader and engine were asked to do.
#[derive(Default)]
pub struct Recorder {
    pub load_attempts: AtomicUsize,
    pub loads: AtomicUsize,
    pub calls: Mutex<Vec<GenerateCall>>,
}

impl Recorder {
    pub fn load_attempts(&self) -> usize {
        self.load_attempts.load(Ordering::SeqCst)
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<GenerateCall> {
        self.calls.lock().unwrap().clone()
    }
}

pub struct StubEngine {
    recorder: Arc<Recorder>,
    reply: Reply,
}

#[async_trait]
impl OcrEngine for StubEngine {
    async fn generate(
        &self,
        inputs: &[PromptInput],
        config: &GenerationConfig,
    ) -> Result<Vec<RequestOutput>> {
        self.recorder.calls.lock().unwrap().push(GenerateCall {
            inputs: inputs.to_vec(),
            config: *config,
        });
        match &self.reply {
            Reply::Text(text) => Ok(inputs
                .iter()
                .map(|_| RequestOutput::from_texts([text.clone()]))
                .collect()),
            Reply::Fail(message) => bail!("{message}"),
            Reply::Empty => Ok(vec![]),
            Reply::Slow(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(vec![RequestOutput::from_texts(["late"])])
            }
        }
    }
}

pub struct StubLoader {
    pub recorder: Arc<Recorder>,
    pub reply: Reply,
    pub fail_load: bool,
    pub load_delay: Duration,
}

impl StubLoader {
    pub fn new(recorder: Arc<Recorder>, reply: Reply) -> Self {
        Self {
            recorder,
            reply,
            fail_load: false,
            load_delay: Duration::ZERO,
        }
    }
}

#[async_trait]
impl ModelLoader for StubLoader {
    async fn load(&self) -> Result<Arc<dyn OcrEngine>> {
        self.recorder.load_attempts.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.load_delay).await;
        if self.fail_load {
            bail!("repository not found");
        }
        self.recorder.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(StubEngine {
            recorder: Arc::clone(&self.recorder),
            reply: self.reply.clone(),
        }))
    }
}

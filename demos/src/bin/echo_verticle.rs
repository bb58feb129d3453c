//! Deploys a verticle that upper-cases whatever body it's sent on
//! `demo.echo`, then fires a request at it and prints the reply.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use verge_core::Body;
use verge_deploy::{DeployContext, DeployError, Verticle};
use verge_runtime::{Runtime, RuntimeConfig};

struct EchoVerticle;

#[async_trait]
impl Verticle for EchoVerticle {
    async fn start(&self, ctx: Arc<DeployContext>) -> Result<(), DeployError> {
        let bus = Arc::clone(ctx.bus());
        let consumer = bus.consumer("demo.echo");
        consumer.handler(move |msg, _hc| {
            let bus = Arc::clone(&bus);
            async move {
                let text: String = msg.body.decode().unwrap_or_default();
                let reply_body = Body::encode(&json!({ "echo": text.to_uppercase() }))?;
                if let Some(reply_to) = &msg.reply_address {
                    bus.send(reply_to, reply_body)?;
                }
                Ok(())
            }
        });
        Ok(())
    }

    async fn stop(&self, _ctx: Arc<DeployContext>) -> Result<(), DeployError> {
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    verge_runtime::init_logging("info");

    let config = RuntimeConfig::default();
    let runtime = Runtime::bootstrap(&config);

    let id = runtime
        .deploy_and_wait(Arc::new(EchoVerticle), json!({}))
        .await
        .expect("echo verticle failed to start");
    tracing::info!(%id, "echo verticle deployed");

    let body = Body::encode(&json!("hello")).expect("encode body");
    match runtime.request("demo.echo", body, std::time::Duration::from_secs(2)).await {
        Ok(reply) => {
            let decoded: serde_json::Value = reply.body.decode().unwrap_or_default();
            println!("reply: {decoded}");
        }
        Err(err) => eprintln!("request failed: {err}"),
    }

    runtime.close().await;
}

mod protocol;
mod room;
mod router;

use std::env;
use std::path::Path;

use log::{info, warn};
use warp::Filter;

use router::RoomRouter;

fn port_from_env() -> u16 {
    match env::var("PORT") {
        Ok(raw) => match raw.parse() {
            Ok(port) => port,
            Err(e) => {
                warn!("ignoring invalid PORT value {raw:?}: {e}");
                8787
            }
        },
        Err(_) => 8787,
    }
}

fn tls_paths() -> Option<(String, String)> {
    let cert = env::var("TLS_CERT").unwrap_or_else(|_| "ssl/cert.pem".to_string());
    let key = env::var("TLS_KEY").unwrap_or_else(|_| "ssl/key.pem".to_string());

    if Path::new(&cert).is_file() && Path::new(&key).is_file() {
        Some((cert, key))
    } else {
        None
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let router = RoomRouter::new();
    let with_router = warp::any().map(move || router.clone());

    // Same route shape the browser client connects to: /parties/chat/<room>,
    // where <room> is "<namespace>-<id>" such as channel-42.
    let ws_route = warp::path!("parties" / "chat" / String)
        .and(warp::ws())
        .and(with_router)
        .and_then(
            |room_key: String, ws: warp::ws::Ws, router: RoomRouter| async move {
                if !RoomRouter::is_valid_key(&room_key) {
                    return Err(warp::reject::not_found());
                }
                Ok(ws.on_upgrade(move |socket| router.handle_connection(room_key, socket)))
            },
        );

    let routes = ws_route.with(warp::cors().allow_any_origin());
    let port = port_from_env();

    match tls_paths() {
        Some((cert, key)) => {
            info!("starting secure server (WSS) on port {port}");
            warp::serve(routes)
                .tls()
                .cert_path(cert)
                .key_path(key)
                .run(([0, 0, 0, 0], port))
                .await;
        }
        None => {
            info!("no TLS cert/key found, serving plaintext WS on port {port}");
            warp::serve(routes).run(([0, 0, 0, 0], port)).await;
        }
    }
}

use std::{sync::Mutex, time::Duration};

use actix_web::{App, HttpRequest, HttpResponse, HttpServer, web};
use serde_json::json;
use wb_ingest::{FetchError, ProductSource, WbSearchClient, identity::IdentityPool};

type Seen = web::Data<Mutex<Vec<(String, String)>>>;

async fn products(req: HttpRequest, seen: Seen) -> HttpResponse {
    let ua = req
        .headers()
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    seen.lock().unwrap().push((ua, req.query_string().to_string()));
    HttpResponse::Ok().json(json!({
        "state": 0,
        "data": { "products": [
            { "id": 1, "name": "Термос", "priceU": 189900, "salePriceU": 129900, "rating": 5, "feedbacks": 41 },
            { "id": 2, "name": "Фляга", "priceU": 59900 }
        ]}
    }))
}

async fn unavailable() -> HttpResponse {
    HttpResponse::ServiceUnavailable().body("try later")
}

async fn garbage() -> HttpResponse {
    HttpResponse::Ok()
        .insert_header(("Content-Type", "text/html"))
        .body("<html>blocked</html>")
}

async fn no_envelope() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "data": {} }))
}

async fn slow() -> HttpResponse {
    tokio::time::sleep(Duration::from_secs(3)).await;
    HttpResponse::Ok().json(json!({ "data": { "products": [] } }))
}

async fn spawn_upstream() -> (String, Seen) {
    let seen: Seen = web::Data::new(Mutex::new(Vec::new()));
    let data = seen.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .route("/search", web::get().to(products))
            .route("/down", web::get().to(unavailable))
            .route("/html", web::get().to(garbage))
            .route("/bare", web::get().to(no_envelope))
            .route("/slow", web::get().to(slow))
    })
    .workers(1)
    .bind(("127.0.0.1", 0))
    .unwrap();
    let addr = server.addrs()[0];
    actix_web::rt::spawn(server.run());
    (format!("http://{addr}"), seen)
}

fn client(base: &str, path: &str) -> WbSearchClient {
    WbSearchClient::new(
        format!("{base}{path}"),
        Duration::from_millis(500),
        IdentityPool::single("wb-ingest-test/1.0"),
    )
    .unwrap()
}

#[actix_web::test]
async fn decodes_products_and_sends_identity() {
    let (base, seen) = spawn_upstream().await;

    let items = client(&base, "/search").fetch_page("термос", 2).await.unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].name.as_deref(), Some("Термос"));
    assert_eq!(items[0].sale_price_u, Some(129900));
    assert_eq!(items[0].rating, Some(5.0));
    assert_eq!(items[1].sale_price_u, None);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let (ua, query) = &seen[0];
    assert_eq!(ua, "wb-ingest-test/1.0");
    assert!(query.contains("page=2"));
    assert!(query.contains("limit=100"));
    assert!(query.contains("resultset=catalog"));
    assert!(query.contains("sort=popular"));
}

#[actix_web::test]
async fn error_status_is_a_fetch_error() {
    let (base, _) = spawn_upstream().await;
    let err = client(&base, "/down").fetch_page("x", 1).await.unwrap_err();
    assert!(matches!(err, FetchError::Status(503)));
}

#[actix_web::test]
async fn non_json_body_is_a_decode_error() {
    let (base, _) = spawn_upstream().await;
    let err = client(&base, "/html").fetch_page("x", 1).await.unwrap_err();
    assert!(matches!(err, FetchError::Decode(_)));
}

#[actix_web::test]
async fn missing_products_path_is_empty() {
    let (base, _) = spawn_upstream().await;
    let items = client(&base, "/bare").fetch_page("x", 1).await.unwrap();
    assert!(items.is_empty());
}

#[actix_web::test]
async fn slow_upstream_times_out() {
    let (base, _) = spawn_upstream().await;
    let err = client(&base, "/slow").fetch_page("x", 1).await.unwrap_err();
    assert!(matches!(err, FetchError::Timeout));
}

#[actix_web::test]
async fn refused_connection_is_transport_error() {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let err = client(&format!("http://127.0.0.1:{port}"), "/search")
        .fetch_page("x", 1)
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Transport(_)));
}

use actix_web::{get, HttpResponse};

#[get("/api/ping")]
pub async fn ping() -> HttpResponse {
    HttpResponse::Ok().body("pong")
}

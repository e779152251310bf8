use std::sync::Arc;

use actix_web::{HttpRequest, HttpResponse, Responder, get, post, routes, web};
use bytes::Bytes;
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::{
    config::{ParseDefaults, delay_from_secs},
    error::ApiError,
    models::{Product, ProductFilter},
    pipeline::{IngestRequest, Ingestor, RunEvent, RunReport},
    store::ProductStore,
};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ProductStore>,
    pub ingestor: Arc<Ingestor>,
    pub defaults: ParseDefaults,
}

// -------------------------
// Request types
// -------------------------

#[derive(Deserialize)]
pub struct ParseReq {
    pub query: String,
    pub limit: Option<usize>,
    /// Seconds between page fetches.
    pub delay: Option<f64>,
}

impl ParseReq {
    fn into_request(self, defaults: &ParseDefaults) -> Result<IngestRequest, ApiError> {
        let query = self.query.trim();
        if query.is_empty() {
            return Err(ApiError::BadRequest("query must not be empty".to_string()));
        }
        let delay = match self.delay {
            Some(secs) => delay_from_secs(secs).ok_or_else(|| {
                ApiError::BadRequest(format!("delay must be a non-negative number, got {secs}"))
            })?,
            None => defaults.delay,
        };
        Ok(IngestRequest::new(query)
            .with_limit(self.limit.unwrap_or(defaults.limit))
            .with_delay(delay))
    }
}

// -------------------------
// HTTP handlers
// -------------------------

#[get("/")]
async fn index() -> impl Responder {
    HttpResponse::Ok().body(
        "wb-ingest online.\n\
         Products:\n  GET  /api/products?min_price=...&min_rating=...&min_feedbacks=...\n\
         Parse:\n  POST /api/parse {\"query\":\"кроссовки\",\"limit\":100,\"delay\":1.0}\n\
         Stream:\n  GET  /api/parse/stream?query=...&limit=100&delay=1.0 (SSE)\n\
         UI:\n  GET  /dashboard",
    )
}

#[get("/healthz")]
async fn healthz() -> impl Responder {
    HttpResponse::Ok().body("ok")
}

#[routes]
#[get("/api/products")]
#[get("/api/products/")]
async fn list_products(
    state: web::Data<AppState>,
    filter: web::Query<ProductFilter>,
) -> Result<web::Json<Vec<Product>>, ApiError> {
    let products = state.store.list(&filter).await?;
    Ok(web::Json(products))
}

#[post("/api/parse")]
async fn parse_endpoint(
    state: web::Data<AppState>,
    body: web::Json<ParseReq>,
) -> Result<web::Json<RunReport>, ApiError> {
    let req = body.into_inner().into_request(&state.defaults)?;
    let report = state.ingestor.run(&req).await;
    Ok(web::Json(report))
}

// --------------
// SSE streaming
// --------------

fn sse_event(event: &str, data_json: &str) -> Bytes {
    let payload = format!("event: {event}\ndata: {data_json}\n\n");
    Bytes::from(payload)
}

fn event_frame(event: &RunEvent) -> Bytes {
    let name = match event {
        RunEvent::Started { .. } => "start",
        RunEvent::Page { .. } => "page",
        RunEvent::Finished(_) => "done",
    };
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    sse_event(name, &data)
}

#[get("/api/parse/stream")]
async fn parse_stream(
    state: web::Data<AppState>,
    q: web::Query<ParseReq>,
) -> Result<HttpResponse, ApiError> {
    let req = q.into_inner().into_request(&state.defaults)?;
    let (tx, mut rx) = mpsc::channel::<RunEvent>(32);
    let ingestor = Arc::clone(&state.ingestor);

    actix_web::rt::spawn(async move {
        ingestor.run_with_events(&req, &tx).await;
    });

    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            yield Ok::<Bytes, actix_web::Error>(event_frame(&event));
        }
    };

    Ok(HttpResponse::Ok()
        .insert_header(("Content-Type", "text/event-stream"))
        .insert_header(("Cache-Control", "no-cache"))
        .insert_header(("Connection", "keep-alive"))
        .streaming(stream))
}

// -------------------------
// Tiny HTML dashboard
// -------------------------

#[get("/dashboard")]
async fn dashboard() -> impl Responder {
    HttpResponse::Ok()
        .insert_header(("Content-Type", "text/html; charset=utf-8"))
        .body(DASHBOARD_HTML)
}

const DASHBOARD_HTML: &str = r##"
<!doctype html>
<html lang="ru" class="dark">
<head>
  <meta charset="utf-8" />
  <title>WB Products</title>

  <script>
    tailwind.config = { darkMode: 'class' };
  </script>
  <script src="https://cdn.tailwindcss.com"></script>
  <script defer src="https://unpkg.com/alpinejs@3.x.x/dist/cdn.min.js"></script>

  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <style>[x-cloak]{display:none!important}</style>
</head>
<body class="bg-slate-900 text-slate-100 antialiased">
  <main class="max-w-6xl mx-auto p-6 flex flex-col gap-6"
        x-data="catalog()"
        x-init="load()">

    <h1 class="text-3xl font-bold tracking-tight">WB Products</h1>

    <!-- Parse run -->
    <div class="bg-slate-800 ring-1 ring-slate-700 rounded-xl p-4 space-y-3">
      <div class="grid grid-cols-1 md:grid-cols-6 gap-3 items-center">
        <input x-model="run.query" type="text" placeholder="кроссовки"
               class="md:col-span-3 rounded-lg bg-slate-900 border-slate-700 px-2 py-1.5 text-sm">
        <input x-model.number="run.limit" type="number" min="0" title="limit"
               class="rounded-lg bg-slate-900 border-slate-700 px-2 py-1.5 text-sm">
        <input x-model.number="run.delay" type="number" min="0" step="0.1" title="delay, s"
               class="rounded-lg bg-slate-900 border-slate-700 px-2 py-1.5 text-sm">
        <button @click="parse()" :disabled="isRunning"
                class="px-2 py-1 text-sm rounded-md bg-indigo-600 hover:bg-indigo-700 disabled:opacity-50">
          <span x-text="isRunning ? 'Парсинг…' : 'Парсить'"></span>
        </button>
      </div>
      <div class="text-sm text-slate-300" x-text="lastRunMsg || '-'"></div>
    </div>

    <!-- Filters -->
    <div class="bg-slate-800 ring-1 ring-slate-700 rounded-xl p-4">
      <div class="grid grid-cols-1 md:grid-cols-5 gap-3 items-end">
        <label class="text-sm text-slate-300">Мин. цена
          <input x-model="filters.min_price" type="number" min="0" step="0.01"
                 class="mt-1 w-full rounded-lg bg-slate-900 border-slate-700 px-2 py-1.5 text-sm">
        </label>
        <label class="text-sm text-slate-300">Мин. рейтинг
          <input x-model="filters.min_rating" type="number" min="0" max="5" step="0.1"
                 class="mt-1 w-full rounded-lg bg-slate-900 border-slate-700 px-2 py-1.5 text-sm">
        </label>
        <label class="text-sm text-slate-300">Мин. отзывов
          <input x-model="filters.min_feedbacks" type="number" min="0"
                 class="mt-1 w-full rounded-lg bg-slate-900 border-slate-700 px-2 py-1.5 text-sm">
        </label>
        <button @click="load()" class="px-2 py-1.5 text-sm rounded-md bg-indigo-600 hover:bg-indigo-700">Применить</button>
        <button @click="reset()" class="px-2 py-1.5 text-sm rounded-md bg-slate-700 hover:bg-slate-600">Сбросить</button>
      </div>
      <div class="mt-2 text-sm text-red-400" x-show="error" x-cloak x-text="error"></div>
    </div>

    <!-- Table -->
    <div class="bg-slate-800 ring-1 ring-slate-700 rounded-xl p-4">
      <table class="min-w-full text-sm">
        <thead class="bg-slate-700">
          <tr class="text-left">
            <template x-for="col in columns" :key="col.field">
              <th class="px-3 py-2 font-medium cursor-pointer select-none" @click="sortBy(col.field)">
                <span x-text="col.label"></span>
                <span x-show="sortField === col.field" x-text="sortOrder === 'asc' ? '▲' : '▼'"></span>
              </th>
            </template>
          </tr>
        </thead>
        <tbody>
          <template x-for="p in paged" :key="p.id">
            <tr class="border-t border-slate-700 hover:bg-slate-700/50">
              <td class="px-3 py-2" x-text="p.name"></td>
              <td class="px-3 py-2 tabular-nums" x-text="p.price + ' ₽'"></td>
              <td class="px-3 py-2 tabular-nums" x-text="p.discount_price + ' ₽'"></td>
              <td class="px-3 py-2 tabular-nums" x-text="p.rating.toFixed(1)"></td>
              <td class="px-3 py-2 tabular-nums" x-text="p.feedback_count"></td>
            </tr>
          </template>
        </tbody>
      </table>
      <div class="mt-4 flex justify-center items-center gap-4 text-sm">
        <button @click="page--" :disabled="page === 1"
                class="px-2 py-1 rounded-md bg-slate-700 disabled:opacity-50">Назад</button>
        <span>Страница <span x-text="page"></span> / <span x-text="pageCount"></span></span>
        <button @click="page++" :disabled="page >= pageCount"
                class="px-2 py-1 rounded-md bg-slate-700 disabled:opacity-50">Вперёд</button>
      </div>
    </div>

    <!-- Charts -->
    <div class="grid grid-cols-1 md:grid-cols-2 gap-6">
      <div class="bg-slate-800 ring-1 ring-slate-700 rounded-xl p-4">
        <h2 class="font-semibold mb-3">Гистограмма цен</h2>
        <template x-for="b in histogram" :key="b.range">
          <div class="flex items-center gap-2 text-xs mb-1">
            <span class="w-28 shrink-0 tabular-nums" x-text="b.range"></span>
            <div class="h-3 bg-indigo-500 rounded" :style="`width: ${b.width}%`"></div>
            <span x-text="b.count"></span>
          </div>
        </template>
      </div>
      <div class="bg-slate-800 ring-1 ring-slate-700 rounded-xl p-4">
        <h2 class="font-semibold mb-3">Скидка vs Рейтинг</h2>
        <div class="relative h-48 border-l border-b border-slate-600">
          <template x-for="(d, i) in discounts" :key="i">
            <div class="absolute w-2 h-2 rounded-full bg-amber-400"
                 :style="`left: ${d.x}%; bottom: ${d.y}%`"
                 :title="`рейтинг ${d.rating}, скидка ${d.discount} ₽`"></div>
          </template>
        </div>
        <div class="text-xs text-slate-400 mt-1" x-show="discounts.length === 0">Нет товаров со скидкой</div>
      </div>
    </div>
  </main>

  <script>
    const PRICE_BUCKETS = [0, 1000, 3000, 5000, 10000, 20000, 50000];

    function catalog() {
      return {
        columns: [
          { field: 'name', label: 'Название' },
          { field: 'price', label: 'Цена' },
          { field: 'discount_price', label: 'Цена со скидкой' },
          { field: 'rating', label: 'Рейтинг' },
          { field: 'feedback_count', label: 'Отзывы' },
        ],
        filters: { min_price: '', min_rating: '', min_feedbacks: '' },
        rows: [],
        error: '',
        sortField: 'discount_price',
        sortOrder: 'asc',
        page: 1,
        perPage: 10,

        run: { query: '', limit: 100, delay: 1.0 },
        isRunning: false,
        lastRunMsg: '',
        _es: null,

        async load() {
          this.error = '';
          const qs = new URLSearchParams(this.filters);
          try {
            const res = await fetch(`/api/products?${qs.toString()}`);
            const body = await res.json();
            if (!res.ok) { this.error = body.error || res.statusText; return; }
            this.rows = body.map(p => ({ ...p, price: Number(p.price), discount_price: Number(p.discount_price) }));
            this.page = 1;
          } catch (e) {
            this.error = String(e);
          }
        },

        reset() {
          this.filters = { min_price: '', min_rating: '', min_feedbacks: '' };
          this.load();
        },

        sortBy(field) {
          if (this.sortField === field) {
            this.sortOrder = this.sortOrder === 'asc' ? 'desc' : 'asc';
          } else {
            this.sortField = field;
            this.sortOrder = 'asc';
          }
        },

        get sorted() {
          const f = this.sortField;
          const dir = this.sortOrder === 'asc' ? 1 : -1;
          return [...this.rows].sort((a, b) => {
            if (f === 'name') return dir * a.name.localeCompare(b.name);
            return dir * (a[f] - b[f]);
          });
        },

        get pageCount() {
          return Math.max(1, Math.ceil(this.rows.length / this.perPage));
        },

        get paged() {
          const start = (this.page - 1) * this.perPage;
          return this.sorted.slice(start, start + this.perPage);
        },

        get histogram() {
          const buckets = PRICE_BUCKETS.slice(0, -1).map((start, i) => {
            const end = PRICE_BUCKETS[i + 1];
            return { range: `${start} - ${end}`, count: this.rows.filter(p => p.price >= start && p.price < end).length };
          });
          const max = Math.max(1, ...buckets.map(b => b.count));
          return buckets.map(b => ({ ...b, width: Math.round(100 * b.count / max) }));
        },

        get discounts() {
          const pts = this.rows
            .filter(p => p.price > p.discount_price)
            .map(p => ({ rating: p.rating.toFixed(1), discount: +(p.price - p.discount_price).toFixed(2) }));
          const max = Math.max(1, ...pts.map(d => d.discount));
          return pts.map(d => ({ ...d, x: Math.min(98, 20 * d.rating), y: Math.min(96, 100 * d.discount / max) }));
        },

        parse() {
          if (!this.run.query.trim()) { this.lastRunMsg = 'Введите запрос'; return; }
          if (this._es) { try { this._es.close(); } catch (_) {} this._es = null; }

          const qs = new URLSearchParams({
            query: this.run.query,
            limit: String(this.run.limit ?? 100),
            delay: String(this.run.delay ?? 1.0),
          });
          this.isRunning = true;
          this.lastRunMsg = 'START';

          const es = new EventSource(`/api/parse/stream?${qs.toString()}`);
          this._es = es;

          es.addEventListener('page', (ev) => {
            const data = JSON.parse(ev.data || '{}');
            this.lastRunMsg = `PAGE ${data.page}: ${data.items} items, ${data.processed} processed`;
          });

          es.addEventListener('done', (ev) => {
            const r = JSON.parse(ev.data || '{}');
            this.lastRunMsg = `DONE: ${r.processed} processed (${r.created} new, ${r.updated} updated), ${r.stop?.reason}`;
            this.isRunning = false;
            es.close();
            this._es = null;
            this.load();
          });

          es.addEventListener('error', () => {
            if (!this.isRunning) return;
            this.lastRunMsg = 'ERROR: connection closed';
            this.isRunning = false;
            es.close();
            this._es = null;
          });
        },
      }
    }
  </script>
</body>
</html>
"##;

fn bad_query(err: actix_web::error::QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::BadRequest(err.to_string()).into()
}

fn bad_json(err: actix_web::error::JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::BadRequest(err.to_string()).into()
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::QueryConfig::default().error_handler(bad_query))
        .app_data(web::JsonConfig::default().error_handler(bad_json))
        .service(index)
        .service(healthz)
        .service(list_products)
        .service(parse_endpoint)
        .service(parse_stream)
        .service(dashboard);
}

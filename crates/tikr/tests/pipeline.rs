//! End-to-end scenarios against a mock provider.

#![cfg(feature = "yahoo")]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{Value, json};
use tikr::{
    Backoff, BindingMode, CellValue, Credential, Endpoints, ErrorKind, InMemoryTokenStore,
    LoginCollaborator, MarketDataEnricher, Pipeline, PriceSource, ReportExporter, Result,
    RetryPolicy, SheetContent, TikrClient, TikrConfig, TokenProvider, TokenStore,
    YahooQuoteSource,
};
use wiremock::matchers::{any, body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug)]
struct FixedLogin;

#[async_trait]
impl LoginCollaborator for FixedLogin {
    async fn login(&self, _email: &str, _password: &str) -> Result<Credential> {
        Ok(Credential::new("fresh"))
    }
}

fn pipeline(server: &MockServer, store: Arc<InMemoryTokenStore>, dir: &Path) -> Pipeline {
    let tokens = Arc::new(
        TokenProvider::new(store)
            .with_login(Arc::new(FixedLogin))
            .with_account(Some("analyst@example.com".to_string()), Some("pw".to_string())),
    );
    let config = TikrConfig::default().with_endpoints(Endpoints::with_base_url(&server.uri()));
    let client = TikrClient::new(&config, tokens).unwrap().with_retry_policy(
        RetryPolicy::default().with_backoff(Backoff::Fixed {
            delay: Duration::ZERO,
        }),
    );
    let quotes = YahooQuoteSource::with_rate_limit(Duration::ZERO)
        .with_base_url(format!("{}/chart", server.uri()));
    let exporter = ReportExporter::new(dir)
        .with_mode(BindingMode::Formulas)
        .with_date(NaiveDate::from_ymd_opt(2024, 6, 28).unwrap());

    Pipeline::new(
        client,
        MarketDataEnricher::new().with_quote_source(Arc::new(quotes)),
        exporter,
    )
}

fn cached(token: &str) -> Arc<InMemoryTokenStore> {
    Arc::new(InMemoryTokenStore::with_credential(Credential::new(token)))
}

/// Builds a financials payload. The latest year of the whole run becomes the
/// LTM column.
fn payload(years: &[i64], items: &[(i64, &[f64])]) -> Value {
    let dates: Vec<Value> = years
        .iter()
        .enumerate()
        .map(|(i, year)| json!({"financialperiodid": i + 1, "calendaryear": year}))
        .collect();
    let data: Vec<Value> = items
        .iter()
        .flat_map(|(id, values)| {
            values.iter().enumerate().map(move |(i, v)| {
                json!({
                    "financialperiodid": i + 1,
                    "dataitemid": id,
                    "dataitemvalue": v.to_string()
                })
            })
        })
        .collect();
    json!({"dates": dates, "data": data})
}

fn income() -> Value {
    payload(
        &[2020, 2021, 2022, 2023, 2024],
        &[
            (28, &[274.5, 365.8, 394.3, 383.3, 385.6]),
            (21, &[66.3, 108.9, 119.4, 114.3, 118.7]),
            (139, &[67.1, 109.2, 119.1, 113.7, 117.6]),
            (75, &[-9.7, -14.5, -19.3, -16.7, -17.1]),
            (15, &[57.4, 94.7, 99.8, 97.0, 100.5]),
            (4053, &[35.0, 28.0, 24.0, 30.0, 28.5]),
            (142, &[3.28, 5.61, 6.11, 6.13, 6.43]),
            (342, &[17_528.0, 16_865.0, 16_326.0, 15_813.0, 15_408.0]),
        ],
    )
}

fn balance() -> Value {
    payload(
        &[2022, 2023, 2024],
        &[
            (4173, &[120.1, 111.1, 104.6]),
            (1049, &[98.9, 95.3, 91.8]),
            (1096, &[23.6, 29.9, 32.7]),
            (1275, &[50.7, 62.1, 66.7]),
        ],
    )
}

fn cash_flow() -> Value {
    payload(
        &[2022, 2023, 2024],
        &[(2006, &[122.2, 110.5, 113.0]), (2021, &[-10.7, -11.0, -9.4])],
    )
}

async fn mount_search(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hits": [
                {"tradingitemid": 2_590_360, "companyid": 24_937, "ticker": "AAPL",
                 "companyname": "Apple Inc.", "exchangesymbol": "NasdaqGS", "primaryflag": 1},
                {"tradingitemid": 2_590_361, "companyid": 24_937, "ticker": "AAPL",
                 "companyname": "Apple Inc.", "exchangesymbol": "BMV", "primaryflag": 0}
            ]
        })))
        .mount(server)
        .await;
}

async fn mount_statement(server: &MockServer, repid: u8, body: Value) {
    Mock::given(method("POST"))
        .and(path("/fin"))
        .and(body_partial_json(json!({"repid": repid, "tid": 2_590_360})))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_statements(server: &MockServer, cash_flow_ok: bool) {
    mount_statement(server, 1, income()).await;
    mount_statement(server, 2, balance()).await;
    if cash_flow_ok {
        mount_statement(server, 3, cash_flow()).await;
    }
}

async fn mount_quote(server: &MockServer, available: bool) {
    let response = if available {
        ResponseTemplate::new(200).set_body_json(json!({
            "chart": {
                "result": [{"meta": {
                    "currency": "USD",
                    "regularMarketPrice": 182.5,
                    "regularMarketTime": 1_719_590_400
                }}],
                "error": null
            }
        }))
    } else {
        ResponseTemplate::new(503)
    };
    Mock::given(method("GET"))
        .and(path("/chart/AAPL"))
        .respond_with(response)
        .mount(server)
        .await;
}

async fn healthy_server() -> MockServer {
    let server = MockServer::start().await;
    mount_search(&server).await;
    mount_statements(&server, true).await;
    mount_quote(&server, true).await;
    server
}

#[tokio::test]
async fn test_full_run_exports_every_sheet() {
    let server = healthy_server().await;
    let dir = tempfile::tempdir().unwrap();

    let outcome = pipeline(&server, cached("cached"), dir.path())
        .run("aapl")
        .await
        .unwrap();

    assert!(outcome.is_complete());
    assert_eq!(outcome.company.name.as_deref(), Some("Apple Inc."));
    assert_eq!(outcome.path, dir.path().join("AAPL_2024-06-28.xlsx"));
    assert!(outcome.path.exists());
    assert_eq!(
        outcome.report.sheet_names(),
        vec![
            "income_statement",
            "cashflow_statement",
            "balancesheet_statement",
            "market_data",
            "sales_to_capital",
            "valuation_base",
        ]
    );

    let snapshot = outcome.snapshot.as_ref().unwrap();
    assert!(!snapshot.partial);
    let derived = snapshot.price(PriceSource::Derived).unwrap().value;
    assert!((derived - 28.5 * 6.43).abs() < 1e-9);
    assert_eq!(snapshot.price(PriceSource::Quote).unwrap().value, 182.5);

    let market = outcome.report.sheet("market_data").unwrap().rows().unwrap();
    assert_eq!(market[0].metric, "current_price");
    assert_eq!(market[0].value.as_f64(), Some(182.5));
    assert!(market[1].value.as_f64().is_some());
    assert!(market[2].value.as_f64().is_some());

    let template = outcome.report.template().unwrap();
    let bound: Vec<&str> = template
        .iter()
        .filter(|c| c.is_bound())
        .map(|c| c.cell)
        .collect();
    for cell in ["O12", "O14", "O18", "O19", "O23", "O25", "O28", "O15", "O16"] {
        assert!(bound.contains(&cell), "{cell} should be bound");
    }
    let value = |address: &str| &template.iter().find(|c| c.cell == address).unwrap().value;
    match value("O15") {
        CellValue::Formula { formula, cached } => {
            assert_eq!(formula, "=sales_to_capital!B2");
            // (385.6 - 383.3) / ((104.6 + 66.7 - 32.7) - (111.1 + 62.1 - 29.9))
            let expected = (385.6 - 383.3) / (138.6 - 143.3);
            assert!((cached.unwrap() - expected).abs() < 1e-9);
        }
        other => panic!("expected formula, got {other:?}"),
    }
    assert_eq!(value("O16"), value("O14"));
    let o19 = template.iter().find(|c| c.cell == "O19").unwrap();
    assert_eq!(
        o19.value,
        CellValue::Formula {
            formula: "=market_data!B2".to_string(),
            cached: Some(182.5),
        }
    );
}

#[tokio::test]
async fn test_statements_ending_on_different_years_share_labels() {
    let server = MockServer::start().await;
    mount_search(&server).await;
    mount_statement(&server, 1, income()).await;
    mount_statement(&server, 2, balance()).await;
    mount_statement(
        &server,
        3,
        payload(
            &[2021, 2022, 2023],
            &[(2006, &[104.0, 122.2, 110.5]), (2021, &[-11.1, -10.7, -11.0])],
        ),
    )
    .await;
    mount_quote(&server, true).await;
    let dir = tempfile::tempdir().unwrap();

    let outcome = pipeline(&server, cached("cached"), dir.path())
        .run("AAPL")
        .await
        .unwrap();

    let columns = |name: &str| -> Vec<String> {
        let df = outcome.report.sheet(name).unwrap().table().unwrap();
        df.get_column_names().iter().map(|c| c.to_string()).collect()
    };
    assert_eq!(columns("cashflow_statement"), ["field", "FY2021", "FY2022", "FY2023"]);
    assert_eq!(
        columns("income_statement"),
        ["field", "FY2020", "FY2021", "FY2022", "FY2023", "LTM"]
    );

    // FY2023 free cash flow joins FY2023 revenue, not the LTM column
    let cash_flow = outcome.report.sheet("cashflow_statement").unwrap().table().unwrap();
    let fields = cash_flow.column("field").unwrap().str().unwrap();
    let row = (0..cash_flow.height())
        .find(|&i| fields.get(i) == Some("free_cash_flow_margin_pct"))
        .unwrap();
    let margin = cash_flow.column("FY2023").unwrap().f64().unwrap().get(row).unwrap();
    assert!((margin - 99.5 / 383.3 * 100.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_invalid_ticker_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();

    let err = pipeline(&server, cached("cached"), dir.path())
        .run("ZZZZZZ")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidTicker);
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn test_expired_credential_recovers_with_identical_result() {
    let baseline_server = healthy_server().await;
    let baseline_dir = tempfile::tempdir().unwrap();
    let baseline = pipeline(&baseline_server, cached("fresh"), baseline_dir.path())
        .run("AAPL")
        .await
        .unwrap();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fin"))
        .and(body_partial_json(json!({"auth": "stale"})))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    mount_search(&server).await;
    mount_statements(&server, true).await;
    mount_quote(&server, true).await;
    let store = cached("stale");
    let dir = tempfile::tempdir().unwrap();

    let recovered = pipeline(&server, store.clone(), dir.path())
        .run("AAPL")
        .await
        .unwrap();

    assert_eq!(store.load().await.unwrap().unwrap().token(), "fresh");
    assert!(recovered.is_complete());
    assert_eq!(recovered.report.sheet_names(), baseline.report.sheet_names());
    for name in ["income_statement", "cashflow_statement", "balancesheet_statement"] {
        let left = recovered.report.sheet(name).unwrap().table().unwrap();
        let right = baseline.report.sheet(name).unwrap().table().unwrap();
        assert!(left.equals_missing(right), "{name} differs after recovery");
    }
    assert_eq!(recovered.report.template(), baseline.report.template());
}

#[tokio::test]
async fn test_quote_outage_yields_partial_snapshot() {
    let server = MockServer::start().await;
    mount_search(&server).await;
    mount_statements(&server, true).await;
    mount_quote(&server, false).await;
    let dir = tempfile::tempdir().unwrap();

    let outcome = pipeline(&server, cached("cached"), dir.path())
        .run("AAPL")
        .await
        .unwrap();

    let snapshot = outcome.snapshot.as_ref().unwrap();
    assert!(snapshot.partial);
    assert!(snapshot.price(PriceSource::Quote).is_none());
    assert_eq!(
        snapshot.preferred_price().unwrap().source,
        PriceSource::Derived
    );
    assert!(outcome.path.exists());

    let market = outcome.report.sheet("market_data").unwrap().rows().unwrap();
    assert_eq!(market[0].value.as_f64(), Some(snapshot.prices[0].value));
    let partial = market.iter().find(|r| r.metric == "partial").unwrap();
    assert_eq!(partial.value, CellValue::Text("true".to_string()));
}

#[tokio::test]
async fn test_cash_flow_outage_exports_partial_artifact() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fin"))
        .and(body_partial_json(json!({"repid": 3})))
        .respond_with(ResponseTemplate::new(502))
        .expect(4)
        .mount(&server)
        .await;
    mount_search(&server).await;
    mount_statements(&server, false).await;
    mount_quote(&server, true).await;
    let dir = tempfile::tempdir().unwrap();

    let outcome = pipeline(&server, cached("cached"), dir.path())
        .run("AAPL")
        .await
        .unwrap();

    assert!(!outcome.is_complete());
    let failure = outcome
        .failure(tikr::StatementType::CashFlow)
        .expect("cash flow failure recorded");
    assert_eq!(failure.kind(), ErrorKind::UpstreamUnavailable);

    let sheet = outcome.report.sheet("cashflow_statement").unwrap();
    match &sheet.content {
        SheetContent::Missing(missing) => {
            assert_eq!(missing.kind, Some(ErrorKind::UpstreamUnavailable));
        }
        other => panic!("expected missing sheet, got {other:?}"),
    }
    assert!(outcome.report.sheet("income_statement").unwrap().table().is_some());
    assert!(outcome.report.sheet("balancesheet_statement").unwrap().table().is_some());
    assert!(outcome.path.exists());
}

#[tokio::test]
async fn test_batch_shares_credentials() {
    let server = healthy_server().await;
    let dir = tempfile::tempdir().unwrap();

    let mut results = pipeline(&server, cached("cached"), dir.path())
        .run_batch(["AAPL", "MSFT", "ZZZZZZ"], 2)
        .await;
    results.sort_by(|a, b| a.0.cmp(&b.0));

    assert_eq!(results.len(), 3);
    assert!(results[0].1.is_ok());
    assert_eq!(
        results[1].1.as_ref().unwrap_err().kind(),
        ErrorKind::CompanyNotFound
    );
    assert_eq!(
        results[2].1.as_ref().unwrap_err().kind(),
        ErrorKind::InvalidTicker
    );
}

use std::str::FromStr;
use std::sync::Arc;

use pricewatch_core::adapters::{coingecko_id, detect_ashare_market, ASHARE_KLINE_URL};
use pricewatch_core::{
    AShareAdapter, BinanceAdapter, CoinGeckoAdapter, CoinMarketCapAdapter, Credentials,
    CustomAdapter, FetchErrorKind, HttpError, HttpResponse, ProviderKind, QuoteRequest,
    QuoteSource, ScriptedHttpClient, Ticker,
};
use rust_decimal::Decimal;

struct ProviderCase {
    kind: ProviderKind,
    base_url: &'static str,
    primary_route: &'static str,
    symbol: &'static str,
    credentials: Credentials,
    client: Arc<ScriptedHttpClient>,
    source: Arc<dyn QuoteSource>,
    expected_price: &'static str,
}

fn keyed(api_key: &str) -> Credentials {
    Credentials {
        api_key: Some(api_key.to_owned()),
        secret_key: None,
    }
}

fn tencent_line(code: &str, price: &str, prev_close: &str, change: &str) -> String {
    let mut fields = vec![String::from("0"); 50];
    fields[1] = String::from("Name");
    fields[2] = code.trim_start_matches(char::is_alphabetic).to_owned();
    fields[3] = price.to_owned();
    fields[4] = prev_close.to_owned();
    fields[32] = change.to_owned();
    format!("v_{code}=\"{}\";", fields.join("~"))
}

fn provider_cases() -> Vec<ProviderCase> {
    let binance = Arc::new(ScriptedHttpClient::new().with_json(
        "https://api.binance.com/api/v3/ticker/24hr",
        r#"{"lastPrice":"51000.00","priceChangePercent":"2.10"}"#,
    ));
    let futures = Arc::new(ScriptedHttpClient::new().with_json(
        "https://fapi.binance.com/fapi/v1/ticker/24hr",
        r#"{"lastPrice":"50990.5","priceChangePercent":"-0.4"}"#,
    ));
    let coingecko = Arc::new(ScriptedHttpClient::new().with_json(
        "https://api.coingecko.com/api/v3/simple/price",
        r#"{"bitcoin":{"usd":51000.25,"usd_24h_change":1.5}}"#,
    ));
    let coinmarketcap = Arc::new(ScriptedHttpClient::new().with_json(
        "https://pro-api.coinmarketcap.com/v1/cryptocurrency/quotes/latest",
        r#"{"status":{"error_code":0},"data":{"BTC":{"quote":{"USD":{"price":51001,"percent_change_24h":1.1}}}}}"#,
    ));
    let line = tencent_line("sh600519", "1849.00", "1800.00", "2.72");
    let (gbk, _, _) = encoding_rs::GBK.encode(&line);
    let ashare = Arc::new(
        ScriptedHttpClient::new().with_route("https://qt.gtimg.cn/q=sh600519", HttpResponse::new(200, gbk.to_vec())),
    );
    let custom = Arc::new(ScriptedHttpClient::new().with_json(
        "https://feed.example.com/quote",
        r#"{"last": 123.45}"#,
    ));

    vec![
        ProviderCase {
            kind: ProviderKind::Binance,
            base_url: "https://api.binance.com/api/v3",
            primary_route: "https://api.binance.com/api/v3/ticker/24hr",
            symbol: "BTCUSDT",
            credentials: Credentials::default(),
            source: Arc::new(BinanceAdapter::spot(binance.clone())),
            client: binance,
            expected_price: "51000.00",
        },
        ProviderCase {
            kind: ProviderKind::BinanceFutures,
            base_url: "https://fapi.binance.com/fapi/v1",
            primary_route: "https://fapi.binance.com/fapi/v1/ticker/24hr",
            symbol: "BTCUSDT",
            credentials: Credentials::default(),
            source: Arc::new(BinanceAdapter::futures(futures.clone())),
            client: futures,
            expected_price: "50990.5",
        },
        ProviderCase {
            kind: ProviderKind::CoinGecko,
            base_url: "https://api.coingecko.com/api/v3",
            primary_route: "https://api.coingecko.com/api/v3/simple/price",
            symbol: "BTCUSDT",
            credentials: Credentials::default(),
            source: Arc::new(CoinGeckoAdapter::new(coingecko.clone())),
            client: coingecko,
            expected_price: "51000.25",
        },
        ProviderCase {
            kind: ProviderKind::CoinMarketCap,
            base_url: "https://pro-api.coinmarketcap.com/v1",
            primary_route: "https://pro-api.coinmarketcap.com/v1/cryptocurrency/quotes/latest",
            symbol: "BTCUSDT",
            credentials: keyed("cmc-key"),
            source: Arc::new(CoinMarketCapAdapter::new(coinmarketcap.clone())),
            client: coinmarketcap,
            expected_price: "51001",
        },
        ProviderCase {
            kind: ProviderKind::AShare,
            base_url: "https://qt.gtimg.cn",
            primary_route: "https://qt.gtimg.cn/q=sh600519",
            symbol: "600519",
            credentials: Credentials::default(),
            source: Arc::new(AShareAdapter::new(ashare.clone())),
            client: ashare,
            expected_price: "1849.00",
        },
        ProviderCase {
            kind: ProviderKind::Custom,
            base_url: "https://feed.example.com/quote",
            primary_route: "https://feed.example.com/quote",
            symbol: "XYZ",
            credentials: Credentials::default(),
            source: Arc::new(CustomAdapter::new(custom.clone())),
            client: custom,
            expected_price: "123.45",
        },
    ]
}

fn request(case: &ProviderCase) -> QuoteRequest {
    QuoteRequest::new(Ticker::parse(case.symbol).expect("valid symbol"), case.base_url)
        .with_credentials(case.credentials.clone())
}

#[tokio::test]
async fn every_provider_normalizes_to_one_quote_shape() {
    for case in provider_cases() {
        assert_eq!(case.source.kind(), case.kind);

        let quote = case
            .source
            .fetch_quote(request(&case))
            .await
            .unwrap_or_else(|error| panic!("provider '{}' failed: {error}", case.kind));

        assert_eq!(
            quote.price,
            Decimal::from_str(case.expected_price).expect("decimal"),
            "provider '{}': price",
            case.kind
        );
        assert!(
            quote.history.len() <= 30,
            "provider '{}': history is bounded",
            case.kind
        );
    }
}

#[tokio::test]
async fn history_failures_never_fail_the_quote() {
    // Only the primary endpoints are scripted, so every history call gets a 404.
    for case in provider_cases() {
        let quote = case
            .source
            .fetch_quote(request(&case))
            .await
            .unwrap_or_else(|error| panic!("provider '{}' failed: {error}", case.kind));
        assert!(quote.history.is_empty(), "provider '{}': history", case.kind);
    }
}

#[tokio::test]
async fn non_success_primary_call_is_upstream_error_with_status() {
    for case in provider_cases() {
        case.client
            .set_route(case.primary_route, HttpResponse::new(503, "maintenance"));

        let error = case
            .source
            .fetch_quote(request(&case))
            .await
            .expect_err("primary call fails");

        assert_eq!(error.kind(), FetchErrorKind::Upstream, "provider '{}'", case.kind);
        assert_eq!(error.status(), Some(503), "provider '{}'", case.kind);
    }
}

#[tokio::test]
async fn transport_failures_are_transport_errors() {
    let client = Arc::new(
        ScriptedHttpClient::new()
            .with_failure("https://api.binance.com", HttpError::new("connection reset")),
    );
    let adapter = BinanceAdapter::spot(client);

    let error = adapter
        .fetch_quote(QuoteRequest::new(
            Ticker::parse("BTCUSDT").expect("valid"),
            "https://api.binance.com/api/v3",
        ))
        .await
        .expect_err("transport failure");

    assert_eq!(error.kind(), FetchErrorKind::Transport);
    assert!(error.retryable());
}

#[tokio::test]
async fn custom_provider_accepts_a_bare_last_field() {
    let client = Arc::new(
        ScriptedHttpClient::new().with_json("https://feed.example.com/quote", r#"{"last": 123.45}"#),
    );
    let adapter = CustomAdapter::new(client.clone());

    let quote = adapter
        .fetch_quote(
            QuoteRequest::new(Ticker::parse("XYZ").expect("valid"), "https://feed.example.com/quote")
                .with_credentials(keyed("feed-token")),
        )
        .await
        .expect("quote");

    assert_eq!(quote.price, Decimal::from_str("123.45").expect("decimal"));
    assert_eq!(quote.change_percent_24h, Decimal::ZERO);
    assert!(quote.history.is_empty());

    let sent = &client.requests()[0];
    assert_eq!(sent.url, "https://feed.example.com/quote?symbol=XYZ");
    assert_eq!(sent.header("authorization"), Some("Bearer feed-token"));
}

#[tokio::test]
async fn ashare_history_comes_from_the_kline_service() {
    let line = tencent_line("sz000001", "11.52", "11.40", "1.05");
    let (gbk, _, _) = encoding_rs::GBK.encode(&line);
    let client = Arc::new(
        ScriptedHttpClient::new()
            .with_route("https://qt.gtimg.cn/q=sz000001", HttpResponse::new(200, gbk.to_vec()))
            .with_json(
                ASHARE_KLINE_URL,
                r#"{"code":0,"data":{"sz000001":{"day":[["2024-01-02","11.0","11.40"],["2024-01-03","11.4","11.52"]]}}}"#,
            ),
    );
    let adapter = AShareAdapter::new(client);

    let quote = adapter
        .fetch_quote(QuoteRequest::new(
            Ticker::parse("000001").expect("valid"),
            "https://qt.gtimg.cn",
        ))
        .await
        .expect("quote");

    assert_eq!(quote.history.len(), 2);
    assert_eq!(quote.history[1], Decimal::from_str("11.52").expect("decimal"));
}

#[test]
fn ashare_codes_resolve_to_their_exchange() {
    assert_eq!(detect_ashare_market("600519"), "sh600519");
    assert_eq!(detect_ashare_market("000001"), "sz000001");
    assert_eq!(detect_ashare_market("399001"), "sz399001");
    assert_eq!(detect_ashare_market("900901"), "sh900901");
    assert_eq!(detect_ashare_market("SZ300750"), "sz300750");
}

#[test]
fn coingecko_ids_fall_back_to_lowercased_base_asset() {
    assert_eq!(coingecko_id("BTCUSDT"), "bitcoin");
    assert_eq!(coingecko_id("ETH"), "ethereum");
    assert_eq!(coingecko_id("NEWCOINUSDT"), "newcoin");
}

use crate::domain::DEFAULT_QUOTE_CURRENCY;

/// Ticker to CoinGecko coin id.
const COINGECKO_IDS: &[(&str, &str)] = &[
    ("BTCUSDT", "bitcoin"),
    ("ETHUSDT", "ethereum"),
    ("SOLUSDT", "solana"),
    ("PAXGUSDT", "pax-gold"),
    ("BNBUSDT", "binancecoin"),
    ("DOGEUSDT", "dogecoin"),
    ("XRPUSDT", "ripple"),
    ("ADAUSDT", "cardano"),
    ("MATICUSDT", "matic-network"),
    ("DOTUSDT", "polkadot"),
    ("AVAXUSDT", "avalanche-2"),
    ("LINKUSDT", "chainlink"),
    ("UNIUSDT", "uniswap"),
    ("LTCUSDT", "litecoin"),
    ("ATOMUSDT", "cosmos"),
    ("HYPEUSDT", "hyperliquid"),
    ("HYPE", "hyperliquid"),
    // tokenized equities
    ("TSLAUSDT", "tesla-xstock"),
    ("TESLAUSDT", "tesla-xstock"),
    ("GOOGLUSDT", "alphabet-xstock"),
    ("GOOGLEUSDT", "alphabet-xstock"),
    ("NVDAUSDT", "nvidia-xstock"),
    ("NVIDIAUSDT", "nvidia-xstock"),
    ("AAPLUSDT", "apple-xstock"),
    ("APPLEUSDT", "apple-xstock"),
    ("MSFTUSDT", "microsoft-xstock"),
    ("MICROSOFTUSDT", "microsoft-xstock"),
    ("AMZNUSDT", "amazon-xstock"),
    ("AMAZONUSDT", "amazon-xstock"),
    ("METAUSDT", "meta-xstock"),
    ("NFLXUSDT", "netflix-xstock"),
    ("NETFLIXUSDT", "netflix-xstock"),
    ("COINUSDT", "coinbase-xstock"),
    ("COINBASEUSDT", "coinbase-xstock"),
    ("TSLA", "tesla-xstock"),
    ("GOOGL", "alphabet-xstock"),
    ("GOOG", "alphabet-xstock"),
    ("NVDA", "nvidia-xstock"),
    ("AAPL", "apple-xstock"),
    ("MSFT", "microsoft-xstock"),
    ("AMZN", "amazon-xstock"),
    ("META", "meta-xstock"),
    ("NFLX", "netflix-xstock"),
    ("COIN", "coinbase-xstock"),
];

/// Ticker to CoinMarketCap symbol.
const COINMARKETCAP_SYMBOLS: &[(&str, &str)] = &[
    ("BTCUSDT", "BTC"),
    ("ETHUSDT", "ETH"),
    ("SOLUSDT", "SOL"),
    ("PAXGUSDT", "PAXG"),
    ("BNBUSDT", "BNB"),
    ("DOGEUSDT", "DOGE"),
    ("XRPUSDT", "XRP"),
    ("ADAUSDT", "ADA"),
    ("MATICUSDT", "MATIC"),
    ("DOTUSDT", "DOT"),
    ("AVAXUSDT", "AVAX"),
    ("LINKUSDT", "LINK"),
    ("UNIUSDT", "UNI"),
    ("LTCUSDT", "LTC"),
    ("ATOMUSDT", "ATOM"),
    ("TSLAUSDT", "TSLA"),
    ("GOOGLUSDT", "GOOGL"),
    ("NVDAUSDT", "NVDA"),
    ("AAPLUSDT", "AAPL"),
    ("MSFTUSDT", "MSFT"),
    ("AMZNUSDT", "AMZN"),
    ("METAUSDT", "META"),
    ("NFLXUSDT", "NFLX"),
    ("COINUSDT", "COIN"),
    ("QQQUSDT", "QQQ"),
    ("SPYUSDT", "SPY"),
    ("VTIUSDT", "VTI"),
    ("IWIUSDT", "IWI"),
];

fn lookup(table: &[(&str, &'static str)], key: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(ticker, _)| *ticker == key)
        .map(|(_, id)| *id)
}

fn lookup_ignore_case(table: &[(&str, &'static str)], key: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(ticker, _)| ticker.eq_ignore_ascii_case(key))
        .map(|(_, id)| *id)
}

/// Resolves a ticker to a CoinGecko coin id.
///
/// Order: exact match, match with the default quote currency appended,
/// case-insensitive match, then the ticker itself with the quote currency
/// stripped and lower-cased.
pub fn coingecko_id(ticker: &str) -> String {
    let trimmed = ticker.trim();
    if let Some(id) = lookup(COINGECKO_IDS, trimmed)
        .or_else(|| lookup(COINGECKO_IDS, &format!("{trimmed}{DEFAULT_QUOTE_CURRENCY}")))
        .or_else(|| lookup_ignore_case(COINGECKO_IDS, trimmed))
    {
        return id.to_owned();
    }

    strip_quote_currency(trimmed).to_ascii_lowercase()
}

/// Resolves a ticker to a CoinMarketCap symbol, falling back to the ticker
/// with the quote currency stripped.
pub fn coinmarketcap_symbol(ticker: &str) -> String {
    let trimmed = ticker.trim();
    match lookup(COINMARKETCAP_SYMBOLS, trimmed) {
        Some(symbol) => symbol.to_owned(),
        None => strip_quote_currency(trimmed).to_ascii_uppercase(),
    }
}

fn strip_quote_currency(ticker: &str) -> &str {
    let suffix_len = DEFAULT_QUOTE_CURRENCY.len();
    let has_suffix = ticker.len() > suffix_len
        && ticker.is_char_boundary(ticker.len() - suffix_len)
        && ticker[ticker.len() - suffix_len..].eq_ignore_ascii_case(DEFAULT_QUOTE_CURRENCY);
    if has_suffix {
        &ticker[..ticker.len() - suffix_len]
    } else {
        ticker
    }
}

/// Adds the Shanghai (`sh`) or Shenzhen (`sz`) prefix to an A-share code.
///
/// An explicit `sh`/`sz` prefix is kept, so index codes like `sh000001` stay
/// reachable. Otherwise codes starting with 6 or 9 go to Shanghai, codes
/// starting with 0, 2 or 3 (which covers the 399xxx Shenzhen indices) go to
/// Shenzhen, and anything else defaults to Shanghai.
pub fn detect_ashare_market(code: &str) -> String {
    let trimmed = code.trim();
    let lower = trimmed.to_ascii_lowercase();
    for market in ["sh", "sz"] {
        if let Some(rest) = lower.strip_prefix(market) {
            if !rest.is_empty() {
                return format!("{market}{rest}");
            }
        }
    }

    let market = match lower.chars().next() {
        Some('6' | '9') => "sh",
        Some('0' | '2' | '3') => "sz",
        _ => "sh",
    };
    format!("{market}{lower}")
}

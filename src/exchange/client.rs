//! Binance USDT-M futures REST client
//!
//! Blocking `reqwest` client with a per-request timeout. Signed endpoints
//! carry `timestamp` and `recvWindow` in the query string followed by the
//! HMAC `signature`; the API key travels in the `X-MBX-APIKEY` header.

use chrono::Utc;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::Method;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use super::auth::Credentials;
use super::error::{ExchangeError, ExchangeResult};
use super::types::{
    kline_close, AccountSnapshot, OpenOrder, OrderAck, PositionSnapshot, RawAccount, RawOrder,
    RawPosition, RawTickerPrice, RawUserTrade, UserTrade,
};
use super::Exchange;
use crate::config::{ExchangeConfig, MarginMode, SymbolConfig};
use crate::grid::format_to_step;
use crate::types::Side;

/// Venue response when the requested margin type is already set
const NO_NEED_TO_CHANGE_MARGIN: i64 = -4046;

pub struct BinanceFuturesClient {
    client: Client,
    base_url: String,
    credentials: Option<Credentials>,
    recv_window: u64,
    qty_step: f64,
    price_tick: f64,
}

impl BinanceFuturesClient {
    pub fn new(cfg: &ExchangeConfig, symbol: &SymbolConfig) -> ExchangeResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds.max(1)))
            .build()?;

        let credentials = match (&cfg.api_key, &cfg.api_secret) {
            (Some(key), Some(secret)) if !key.is_empty() && !secret.is_empty() => {
                Some(Credentials::new(key.clone(), secret.clone()))
            }
            _ => None,
        };

        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            credentials,
            recv_window: cfg.recv_window,
            qty_step: symbol.min_qty_step,
            price_tick: symbol.price_tick,
        })
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    fn public<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> ExchangeResult<T> {
        let query = encode(params);
        let url = if query.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, query)
        };
        debug!("GET {}", path);
        self.send(path, self.client.get(url))
    }

    fn signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> ExchangeResult<T> {
        let creds = self.credentials.as_ref().ok_or_else(|| ExchangeError::Api {
            endpoint: path.to_string(),
            status: 401,
            body: "API key and secret are not configured".to_string(),
        })?;

        let mut query = encode(params);
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(&format!(
            "timestamp={}&recvWindow={}",
            Utc::now().timestamp_millis(),
            self.recv_window
        ));
        let signature = creds.sign(&query);
        let url = format!("{}{}?{}&signature={}", self.base_url, path, query, signature);

        debug!("{} {}", method, path);
        let request = self
            .client
            .request(method, url)
            .header("X-MBX-APIKEY", creds.api_key());
        self.send(path, request)
    }

    fn send<T: DeserializeOwned>(&self, path: &str, request: RequestBuilder) -> ExchangeResult<T> {
        let response = request.send()?;
        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(ExchangeError::Api {
                endpoint: path.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|e| ExchangeError::Parse(format!("{}: {}", path, e)))
    }

    fn qty(&self, qty: f64) -> String {
        format_to_step(qty, self.qty_step)
    }

    fn price(&self, price: f64) -> String {
        format_to_step(price, self.price_tick)
    }
}

fn encode(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

impl Exchange for BinanceFuturesClient {
    fn get_price(&self, symbol: &str) -> ExchangeResult<f64> {
        let raw: RawTickerPrice =
            self.public("/fapi/v1/ticker/price", &[("symbol", symbol.to_string())])?;
        raw.price
            .trim()
            .parse()
            .map_err(|_| ExchangeError::Parse(format!("ticker price '{}'", raw.price)))
    }

    fn get_klines(&self, symbol: &str, interval: &str, limit: usize) -> ExchangeResult<Vec<f64>> {
        let raw: Vec<Vec<serde_json::Value>> = self.public(
            "/fapi/v1/klines",
            &[
                ("symbol", symbol.to_string()),
                ("interval", interval.to_string()),
                ("limit", limit.min(1500).to_string()),
            ],
        )?;
        Ok(raw.iter().filter_map(|k| kline_close(k)).collect())
    }

    fn get_position(&self, symbol: &str) -> ExchangeResult<PositionSnapshot> {
        let raw: Vec<RawPosition> = self.signed(
            Method::GET,
            "/fapi/v2/positionRisk",
            &[("symbol", symbol.to_string())],
        )?;
        Ok(raw
            .iter()
            .find(|p| p.symbol == symbol)
            .map(PositionSnapshot::from)
            .unwrap_or_default())
    }

    fn get_open_orders(&self, symbol: &str) -> ExchangeResult<Vec<OpenOrder>> {
        let raw: Vec<RawOrder> = self.signed(
            Method::GET,
            "/fapi/v1/openOrders",
            &[("symbol", symbol.to_string())],
        )?;
        Ok(raw.into_iter().filter_map(RawOrder::into_open_order).collect())
    }

    fn place_market_order(&self, symbol: &str, side: Side, qty: f64) -> ExchangeResult<OrderAck> {
        let raw: RawOrder = self.signed(
            Method::POST,
            "/fapi/v1/order",
            &[
                ("symbol", symbol.to_string()),
                ("side", side.as_str().to_string()),
                ("type", "MARKET".to_string()),
                ("quantity", self.qty(qty)),
                ("newOrderRespType", "RESULT".to_string()),
            ],
        )?;
        Ok(raw.into())
    }

    fn place_limit_tp(
        &self,
        symbol: &str,
        side: Side,
        qty: f64,
        price: f64,
    ) -> ExchangeResult<OrderAck> {
        let raw: RawOrder = self.signed(
            Method::POST,
            "/fapi/v1/order",
            &[
                ("symbol", symbol.to_string()),
                ("side", side.as_str().to_string()),
                ("type", "LIMIT".to_string()),
                ("timeInForce", "GTC".to_string()),
                ("quantity", self.qty(qty)),
                ("price", self.price(price)),
                ("reduceOnly", "true".to_string()),
            ],
        )?;
        Ok(raw.into())
    }

    fn cancel_all_open_orders(&self, symbol: &str) -> ExchangeResult<()> {
        let _: serde_json::Value = self.signed(
            Method::DELETE,
            "/fapi/v1/allOpenOrders",
            &[("symbol", symbol.to_string())],
        )?;
        Ok(())
    }

    fn get_account(&self) -> ExchangeResult<AccountSnapshot> {
        let raw: RawAccount = self.signed(Method::GET, "/fapi/v2/account", &[])?;
        Ok(raw.into())
    }

    fn get_user_trades(
        &self,
        symbol: &str,
        from_order_id: Option<u64>,
        limit: usize,
    ) -> ExchangeResult<Vec<UserTrade>> {
        let mut params = vec![
            ("symbol", symbol.to_string()),
            ("limit", limit.min(1000).to_string()),
        ];
        if let Some(id) = from_order_id {
            params.push(("orderId", id.to_string()));
        }
        let raw: Vec<RawUserTrade> = self.signed(Method::GET, "/fapi/v1/userTrades", &params)?;
        let mut trades: Vec<UserTrade> =
            raw.into_iter().filter_map(RawUserTrade::into_trade).collect();
        trades.sort_by_key(|t| t.time);
        Ok(trades)
    }

    fn get_order(&self, symbol: &str, order_id: u64) -> ExchangeResult<OrderAck> {
        let raw: RawOrder = self.signed(
            Method::GET,
            "/fapi/v1/order",
            &[
                ("symbol", symbol.to_string()),
                ("orderId", order_id.to_string()),
            ],
        )?;
        Ok(raw.into())
    }

    fn set_leverage(&self, symbol: &str, leverage: u32) -> ExchangeResult<()> {
        let _: serde_json::Value = self.signed(
            Method::POST,
            "/fapi/v1/leverage",
            &[
                ("symbol", symbol.to_string()),
                ("leverage", leverage.to_string()),
            ],
        )?;
        Ok(())
    }

    fn set_margin_mode(&self, symbol: &str, mode: MarginMode) -> ExchangeResult<()> {
        let result: ExchangeResult<serde_json::Value> = self.signed(
            Method::POST,
            "/fapi/v1/marginType",
            &[
                ("symbol", symbol.to_string()),
                ("marginType", mode.as_venue_str().to_string()),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(ExchangeError::Api { ref body, .. })
                if venue_code(body) == Some(NO_NEED_TO_CHANGE_MARGIN) =>
            {
                debug!("Margin type already {}", mode.as_venue_str());
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// `code` field of a venue error body
fn venue_code(body: &str) -> Option<i64> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()?
        .get("code")?
        .as_i64()
}

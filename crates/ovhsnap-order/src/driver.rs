// SPDX-FileCopyrightText: 2026 Ovhsnap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The cart/checkout protocol driver.
//!
//! One [`OrderDriver::place_order`] call executes one strictly ordered
//! attempt: create cart, assign it, add the item, apply required and chosen
//! configurations, read the price preview, check out. Each HTTP step is
//! bounded by the client's 20-second deadline and the whole sequence by
//! [`ORDER_TIMEOUT`]; on timeout the half-built cart is abandoned (OVH
//! expires carts on its own).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use ovhsnap_core::{Account, OrderPlacer, OrderResult, Price, PriceQuoter, SnapError};
use ovhsnap_ovh::{ClientPool, OvhClient};

/// Deadline for one whole order sequence.
pub const ORDER_TIMEOUT: Duration = Duration::from_secs(90);

/// Cart description visible in the OVH order history.
const CART_DESCRIPTION: &str = "ovhsnap";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CartCreated {
    cart_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CartItem {
    item_id: i64,
}

/// One entry of the item's required-configurations list.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequiredConfiguration {
    pub label: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub allowed_values: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MoneyValue {
    value: f64,
    #[serde(default)]
    currency_code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PricesBlock {
    with_tax: Option<MoneyValue>,
    without_tax: Option<MoneyValue>,
    tax: Option<MoneyValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutPreview {
    #[serde(default)]
    prices: Option<PricesBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutResult {
    order_id: i64,
    #[serde(default)]
    url: String,
    #[serde(default)]
    prices: Option<PricesBlock>,
}

/// Stateless protocol wrapper over OVH's order endpoints.
///
/// The only state is the per-plan required-configurations cache; everything
/// else lives for a single attempt.
pub struct OrderDriver {
    pool: Arc<ClientPool>,
    required_configs: Mutex<HashMap<String, Vec<RequiredConfiguration>>>,
}

impl OrderDriver {
    pub fn new(pool: Arc<ClientPool>) -> Self {
        Self {
            pool,
            required_configs: Mutex::new(HashMap::new()),
        }
    }

    /// Steps 1-3: cart, assign, add item. Shared by ordering and quoting.
    async fn build_cart(
        &self,
        client: &OvhClient,
        account: &Account,
        plan_code: &str,
        datacenter: &str,
    ) -> Result<(String, i64), SnapError> {
        let cart: CartCreated = client
            .post_json(
                "/order/cart",
                &json!({
                    "ovhSubsidiary": account.zone,
                    "description": CART_DESCRIPTION,
                }),
            )
            .await
            .map_err(|e| SnapError::CartCreateFailed {
                message: e.to_string(),
            })?;
        debug!(cart_id = %cart.cart_id, plan_code, datacenter, "cart created");

        client
            .post_empty(&format!("/order/cart/{}/assign", cart.cart_id))
            .await?;

        let family = cart_item_path(plan_code);
        let item: CartItem = client
            .post_json(
                &format!("/order/cart/{}/{}", cart.cart_id, family),
                &json!({
                    "planCode": plan_code,
                    "pricingMode": "default",
                    "quantity": 1,
                    "duration": "P1M",
                    "configuration": [
                        {"label": "dedicated_datacenter", "value": datacenter}
                    ],
                }),
            )
            .await
            .map_err(classify_add_item_error)?;

        Ok((cart.cart_id, item.item_id))
    }

    /// Steps 4: required configurations (cached per plan) plus chosen options.
    async fn configure_item(
        &self,
        client: &OvhClient,
        plan_code: &str,
        cart_id: &str,
        item_id: i64,
        datacenter: &str,
        options: &[String],
    ) -> Result<(), SnapError> {
        let required = self
            .required_configurations(client, plan_code, cart_id, item_id)
            .await?;

        let config_path = format!("/order/cart/{cart_id}/item/{item_id}/configuration");
        for rc in required.iter().filter(|rc| rc.required) {
            if rc.label == "dedicated_datacenter" {
                continue; // set at add-item time
            }
            let Some(value) = required_value(rc, datacenter) else {
                continue;
            };
            client
                .post_json::<Value>(
                    &config_path,
                    &json!({"label": rc.label, "value": value}),
                )
                .await?;
        }

        for code in options {
            client
                .post_json::<Value>(
                    &config_path,
                    &json!({"label": option_label(code), "value": code}),
                )
                .await?;
        }
        Ok(())
    }

    async fn required_configurations(
        &self,
        client: &OvhClient,
        plan_code: &str,
        cart_id: &str,
        item_id: i64,
    ) -> Result<Vec<RequiredConfiguration>, SnapError> {
        {
            let cache = self.required_configs.lock().await;
            if let Some(cached) = cache.get(plan_code) {
                return Ok(cached.clone());
            }
        }
        let fetched: Vec<RequiredConfiguration> = client
            .get_json(&format!(
                "/order/cart/{cart_id}/item/{item_id}/requiredConfiguration"
            ))
            .await?;
        self.required_configs
            .lock()
            .await
            .insert(plan_code.to_string(), fetched.clone());
        Ok(fetched)
    }

    /// Step 5: validate the cart and pull the price preview.
    async fn price_preview(
        &self,
        client: &OvhClient,
        cart_id: &str,
    ) -> Result<Option<Price>, SnapError> {
        let preview: CheckoutPreview = client
            .get_json(&format!("/order/cart/{cart_id}/checkout"))
            .await?;
        Ok(preview.prices.and_then(extract_price))
    }

    async fn run_sequence(
        &self,
        account: &Account,
        plan_code: &str,
        datacenter: &str,
        options: &[String],
        auto_pay: bool,
    ) -> Result<OrderResult, SnapError> {
        let client = self.pool.client_for(account)?;

        let (cart_id, item_id) = self
            .build_cart(&client, account, plan_code, datacenter)
            .await?;
        self.configure_item(&client, plan_code, &cart_id, item_id, datacenter, options)
            .await?;
        let price = self.price_preview(&client, &cart_id).await?;

        let order: CheckoutResult = client
            .post_json(
                &format!("/order/cart/{cart_id}/checkout"),
                &json!({
                    "autoPayWithPreferredPaymentMethod": auto_pay,
                    "waiveRetractationPeriod": true,
                }),
            )
            .await?;

        let price = price.or_else(|| order.prices.and_then(extract_price));
        let payment_error = if auto_pay {
            self.check_payment(&client, order.order_id).await
        } else {
            None
        };

        Ok(OrderResult {
            order_id: order.order_id,
            url: order.url,
            price,
            payment_error,
        })
    }

    /// Step 7: best-effort auto-payment verification.
    ///
    /// The slot is secured by checkout either way; a declined payment only
    /// annotates the result.
    async fn check_payment(&self, client: &OvhClient, order_id: i64) -> Option<String> {
        match client
            .get_json::<String>(&format!("/me/order/{order_id}/status"))
            .await
        {
            Ok(status) if matches!(status.as_str(), "notPaid" | "refused" | "cancelled") => {
                Some(format!("payment not completed: order status {status}"))
            }
            Ok(status) => {
                debug!(order_id, %status, "order payment status");
                None
            }
            Err(e) => {
                warn!(order_id, error = %e, "payment status check failed");
                None
            }
        }
    }
}

#[async_trait]
impl OrderPlacer for OrderDriver {
    async fn place_order(
        &self,
        account: &Account,
        plan_code: &str,
        datacenter: &str,
        options: &[String],
        auto_pay: bool,
    ) -> Result<OrderResult, SnapError> {
        tokio::time::timeout(
            ORDER_TIMEOUT,
            self.run_sequence(account, plan_code, datacenter, options, auto_pay),
        )
        .await
        .map_err(|_| SnapError::Timeout {
            duration: ORDER_TIMEOUT,
        })?
    }
}

#[async_trait]
impl PriceQuoter for OrderDriver {
    /// Price a configuration by running steps 1-5 and abandoning the cart.
    async fn quote(
        &self,
        account: &Account,
        plan_code: &str,
        datacenter: &str,
        options: &[String],
    ) -> Result<Price, SnapError> {
        let quote = async {
            let client = self.pool.client_for(account)?;
            let (cart_id, item_id) = self
                .build_cart(&client, account, plan_code, datacenter)
                .await?;
            self.configure_item(&client, plan_code, &cart_id, item_id, datacenter, options)
                .await?;
            self.price_preview(&client, &cart_id).await
        };
        tokio::time::timeout(ORDER_TIMEOUT, quote)
            .await
            .map_err(|_| SnapError::Timeout {
                duration: ORDER_TIMEOUT,
            })??
            .ok_or_else(|| SnapError::Internal("checkout preview carried no prices".into()))
    }
}

fn extract_price(prices: PricesBlock) -> Option<Price> {
    let with_tax = prices.with_tax?;
    let without_tax = prices.without_tax.as_ref().map(|p| p.value);
    let tax = prices.tax.as_ref().map(|p| p.value);
    let currency_code = with_tax
        .currency_code
        .clone()
        .unwrap_or_else(|| "EUR".to_string());
    let without_tax = without_tax.unwrap_or(with_tax.value);
    Some(Price {
        with_tax: with_tax.value,
        without_tax,
        tax: tax.unwrap_or(with_tax.value - without_tax),
        currency_code,
    })
}

/// Cart item endpoint per plan family: Kimsufi and So-you-Start SKUs go
/// through the eco catalog, everything else through bare-metal.
fn cart_item_path(plan_code: &str) -> &'static str {
    let lower = plan_code.to_ascii_lowercase();
    let is_eco = lower.starts_with("ks")
        || lower.starts_with("sys")
        || (lower.len() >= 4
            && lower.as_bytes()[..2].iter().all(u8::is_ascii_digit)
            && &lower[2..4] == "sk");
    if is_eco {
        "eco"
    } else {
        "baremetalServers"
    }
}

/// Configuration family for a chosen option code.
fn option_label(code: &str) -> &'static str {
    if code.starts_with("ram") {
        "memory"
    } else if code.starts_with("softraid") || code.starts_with("hybridsoftraid") || code.starts_with("raid") {
        "storage"
    } else if code.starts_with("bandwidth") {
        "bandwidth"
    } else if code.starts_with("vrack") {
        "vrack"
    } else {
        "option"
    }
}

/// Pick a value for a required configuration entry.
fn required_value(rc: &RequiredConfiguration, datacenter: &str) -> Option<String> {
    match rc.label.as_str() {
        "region" => {
            let region = region_for_datacenter(datacenter);
            rc.allowed_values
                .iter()
                .find(|v| v.to_ascii_lowercase().contains(region))
                .or_else(|| rc.allowed_values.first())
                .cloned()
        }
        label if label.contains("os") => {
            let default_os = "none_64.en";
            if rc.allowed_values.is_empty()
                || rc.allowed_values.iter().any(|v| v == default_os)
            {
                Some(default_os.to_string())
            } else {
                rc.allowed_values.first().cloned()
            }
        }
        _ => rc.allowed_values.first().cloned(),
    }
}

/// Coarse region bucket for a datacenter code, used to select the required
/// `region` configuration value.
fn region_for_datacenter(dc: &str) -> &'static str {
    match &dc.to_ascii_lowercase()[..] {
        "bhs" => "canada",
        "vin" | "hil" => "us",
        "sgp" | "syd" | "ynm" | "mum" => "apac",
        _ => "europe",
    }
}

/// Stock rejections at add-item time surface as `NotAvailable`; the
/// scheduler treats them like an empty probe and retries next tick.
fn classify_add_item_error(e: SnapError) -> SnapError {
    match e {
        SnapError::Api {
            status,
            code,
            message,
        } => {
            let lower = message.to_ascii_lowercase();
            if lower.contains("available") || lower.contains("stock") {
                SnapError::NotAvailable { message }
            } else {
                SnapError::Api {
                    status,
                    code,
                    message,
                }
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ovhsnap_core::EndpointRegion;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn account() -> Account {
        Account {
            id: "acct".into(),
            alias: "acct".into(),
            zone: "IE".into(),
            endpoint_region: EndpointRegion::OvhEu,
            application_key: "ak".into(),
            application_secret: "as".into(),
            consumer_key: "ck".into(),
        }
    }

    async fn mock_time(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/auth/time"))
            .respond_with(ResponseTemplate::new(200).set_body_string("0"))
            .mount(server)
            .await;
    }

    fn driver(server: &MockServer) -> OrderDriver {
        OrderDriver::new(Arc::new(ClientPool::with_base_url(server.uri())))
    }

    #[test]
    fn eco_plans_use_eco_endpoint() {
        assert_eq!(cart_item_path("24sk202"), "eco");
        assert_eq!(cart_item_path("25sk010"), "eco");
        assert_eq!(cart_item_path("ks-le-2"), "eco");
        assert_eq!(cart_item_path("sys-le-1"), "eco");
        assert_eq!(cart_item_path("24rise01"), "baremetalServers");
        assert_eq!(cart_item_path("24adv02"), "baremetalServers");
    }

    #[test]
    fn option_labels_by_prefix() {
        assert_eq!(option_label("ram-64g-noecc-2133"), "memory");
        assert_eq!(option_label("softraid-2x480ssd"), "storage");
        assert_eq!(option_label("hybridsoftraid-2x4000sa-1x500nvme"), "storage");
        assert_eq!(option_label("bandwidth-1000"), "bandwidth");
        assert_eq!(option_label("vrack-bandwidth-100"), "vrack");
        assert_eq!(option_label("something-else"), "option");
    }

    #[test]
    fn region_selection_for_datacenters() {
        assert_eq!(region_for_datacenter("gra"), "europe");
        assert_eq!(region_for_datacenter("rbx"), "europe");
        assert_eq!(region_for_datacenter("bhs"), "canada");
        assert_eq!(region_for_datacenter("sgp"), "apac");
        assert_eq!(region_for_datacenter("vin"), "us");
    }

    #[test]
    fn required_value_prefers_matching_region() {
        let rc = RequiredConfiguration {
            label: "region".into(),
            required: true,
            allowed_values: vec!["europe".into(), "canada".into()],
        };
        assert_eq!(required_value(&rc, "bhs").as_deref(), Some("canada"));
        assert_eq!(required_value(&rc, "gra").as_deref(), Some("europe"));
    }

    #[test]
    fn required_value_defaults_os_to_none() {
        let rc = RequiredConfiguration {
            label: "dedicated_os".into(),
            required: true,
            allowed_values: vec![],
        };
        assert_eq!(required_value(&rc, "gra").as_deref(), Some("none_64.en"));
    }

    #[test]
    fn add_item_stock_rejection_maps_to_not_available() {
        let err = classify_add_item_error(SnapError::Api {
            status: 400,
            code: "Client::BadRequest".into(),
            message: "this datacenter is not available for this plan".into(),
        });
        assert!(matches!(err, SnapError::NotAvailable { .. }));

        let err = classify_add_item_error(SnapError::Api {
            status: 400,
            code: "Client::BadRequest".into(),
            message: "invalid duration".into(),
        });
        assert!(matches!(err, SnapError::Api { .. }));
    }

    async fn mount_happy_path(server: &MockServer, auto_pay_status: Option<&str>) {
        mock_time(server).await;

        Mock::given(method("POST"))
            .and(path("/order/cart"))
            .and(body_partial_json(serde_json::json!({"ovhSubsidiary": "IE"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"cartId": "cart-1"})),
            )
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/order/cart/cart-1/assign"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!(null)))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/order/cart/cart-1/eco"))
            .and(body_partial_json(serde_json::json!({
                "planCode": "24sk202",
                "pricingMode": "default",
                "quantity": 1,
                "duration": "P1M",
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"itemId": 77, "cartId": "cart-1"})),
            )
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/order/cart/cart-1/item/77/requiredConfiguration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"label": "region", "required": true, "allowedValues": ["europe", "canada"]},
                {"label": "dedicated_os", "required": true, "allowedValues": ["none_64.en"]}
            ])))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/order/cart/cart-1/item/77/configuration"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 1})),
            )
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/order/cart/cart-1/checkout"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "prices": {
                    "withTax": {"value": 50.0, "currencyCode": "EUR"},
                    "withoutTax": {"value": 41.67, "currencyCode": "EUR"},
                    "tax": {"value": 8.33, "currencyCode": "EUR"}
                }
            })))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/order/cart/cart-1/checkout"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "orderId": 123456,
                "url": "https://www.ovh.com/cgi-bin/order/display.cgi?orderId=123456"
            })))
            .mount(server)
            .await;
        if let Some(status) = auto_pay_status {
            Mock::given(method("GET"))
                .and(path("/me/order/123456/status"))
                .respond_with(
                    ResponseTemplate::new(200).set_body_json(serde_json::json!(status)),
                )
                .mount(server)
                .await;
        }
    }

    #[tokio::test]
    async fn place_order_runs_full_sequence() {
        let server = MockServer::start().await;
        mount_happy_path(&server, None).await;

        let driver = driver(&server);
        let result = driver
            .place_order(
                &account(),
                "24sk202",
                "gra",
                &["ram-64g-noecc-2133".to_string()],
                false,
            )
            .await
            .unwrap();

        assert_eq!(result.order_id, 123456);
        assert!(result.url.contains("orderId=123456"));
        let price = result.price.unwrap();
        assert_eq!(price.with_tax, 50.0);
        assert_eq!(price.currency_code, "EUR");
        assert!(result.payment_error.is_none());
    }

    #[tokio::test]
    async fn auto_pay_failure_is_annotated_not_fatal() {
        let server = MockServer::start().await;
        mount_happy_path(&server, Some("notPaid")).await;

        let driver = driver(&server);
        let result = driver
            .place_order(&account(), "24sk202", "gra", &[], true)
            .await
            .unwrap();

        assert_eq!(result.order_id, 123456);
        let message = result.payment_error.unwrap();
        assert!(message.contains("notPaid"), "got: {message}");
    }

    #[tokio::test]
    async fn delivered_auto_pay_has_no_payment_error() {
        let server = MockServer::start().await;
        mount_happy_path(&server, Some("delivered")).await;

        let driver = driver(&server);
        let result = driver
            .place_order(&account(), "24sk202", "gra", &[], true)
            .await
            .unwrap();
        assert!(result.payment_error.is_none());
    }

    #[tokio::test]
    async fn cart_create_failure_aborts_attempt() {
        let server = MockServer::start().await;
        mock_time(&server).await;
        Mock::given(method("POST"))
            .and(path("/order/cart"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_json(serde_json::json!({"message": "internal"})),
            )
            .mount(&server)
            .await;

        let driver = driver(&server);
        let err = driver
            .place_order(&account(), "24sk202", "gra", &[], false)
            .await
            .unwrap_err();
        assert!(matches!(err, SnapError::CartCreateFailed { .. }), "{err}");
    }

    #[tokio::test]
    async fn add_item_stock_race_returns_not_available() {
        let server = MockServer::start().await;
        mock_time(&server).await;
        Mock::given(method("POST"))
            .and(path("/order/cart"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"cartId": "cart-1"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/order/cart/cart-1/assign"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!(null)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/order/cart/cart-1/eco"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "class": "Client::BadRequest",
                "message": "No datacenter available for this configuration"
            })))
            .mount(&server)
            .await;

        let driver = driver(&server);
        let err = driver
            .place_order(&account(), "24sk202", "gra", &[], false)
            .await
            .unwrap_err();
        assert!(matches!(err, SnapError::NotAvailable { .. }), "{err}");
    }

    #[tokio::test]
    async fn quote_returns_price_without_checkout() {
        let server = MockServer::start().await;
        mount_happy_path(&server, None).await;

        let driver = driver(&server);
        let price = driver
            .quote(&account(), "24sk202", "gra", &[])
            .await
            .unwrap();
        assert_eq!(price.with_tax, 50.0);
        assert_eq!(price.without_tax, 41.67);

        // The checkout POST must not have fired.
        let received = server.received_requests().await.unwrap();
        assert!(!received
            .iter()
            .any(|r| r.method.as_str() == "POST" && r.url.path().ends_with("/checkout")));
    }

    #[tokio::test]
    async fn required_configurations_cached_per_plan() {
        let server = MockServer::start().await;
        mount_happy_path(&server, None).await;

        let driver = driver(&server);
        driver
            .place_order(&account(), "24sk202", "gra", &[], false)
            .await
            .unwrap();
        driver
            .place_order(&account(), "24sk202", "gra", &[], false)
            .await
            .unwrap();

        let received = server.received_requests().await.unwrap();
        let required_fetches = received
            .iter()
            .filter(|r| r.url.path().ends_with("/requiredConfiguration"))
            .count();
        assert_eq!(required_fetches, 1, "second order reuses the cached list");
    }
}

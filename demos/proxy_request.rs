//! Demonstrates forwarding an inbound `/api/proxy` request through [`XubioClient`]: the token is
//! fetched once, attached as a bearer header, and the upstream reply is passed through with CORS
//! headers.

// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
// self
use xubio_session::{
	XubioClient,
	config::{XubioConfig, vars},
	proxy::ProxyRequest,
	reqwest::Method,
	url::Url,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/TokenEndpoint");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"demo-token\",\"expires_in\":3600}");
		})
		.await;
	let api_mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/API/1.1/clienteBean")
				.header("authorization", "Bearer demo-token");
			then.status(200)
				.header("content-type", "application/json")
				.body("[{\"cliente_id\":7,\"nombre\":\"Acme SA\"}]");
		})
		.await;
	let token_endpoint = server.url("/TokenEndpoint");
	let api_base = server.url("/API/1.1");
	let config = XubioConfig::from_lookup(|name| match name {
		vars::CLIENT_ID => Some("demo-client".into()),
		vars::SECRET_ID => Some("demo-secret".into()),
		vars::TOKEN_ENDPOINT => Some(token_endpoint.clone()),
		vars::API_BASE => Some(api_base.clone()),
		_ => None,
	})?;
	let client = XubioClient::from_config(config)?;
	let proxy = client.proxy();
	let inbound = Url::parse("https://billing.example.com/api/proxy?path=/clienteBean")?;

	for _ in 0..2 {
		let response = proxy.handle(ProxyRequest::from_url(Method::GET, &inbound)).await;

		println!("Proxy answered {} with {:?}.", response.status, response.body);
	}

	token_mock.assert_calls_async(1).await;
	api_mock.assert_calls_async(2).await;

	Ok(())
}

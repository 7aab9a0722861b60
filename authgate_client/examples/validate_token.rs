use authgate_client::{AuthFacade, AuthServerConfig, ClientId, ClientSecret, Realm};
use authgate_clock::DurationSecs;
use authgate_jose::{jwt::Issuer, Jwt};
use clap::Parser;

#[derive(Debug, Parser)]
struct Opts {
    /// The authorization server's base URL
    #[clap(short, long, env = "AUTH_BASE_URL")]
    base_url: String,

    /// The realm this service belongs to
    #[clap(short, long, env = "AUTH_REALM")]
    realm: Realm,

    /// The client ID of this service
    #[clap(short, long, env = "AUTH_CLIENT_ID")]
    client_id: ClientId,

    /// The client secret of this service
    #[clap(short = 's', long, env = "AUTH_CLIENT_SECRET", hide_env_values = true)]
    client_secret: ClientSecret,

    /// Issuer that tokens must carry
    #[clap(short, long, env = "AUTH_ISSUER")]
    issuer: Option<Issuer>,

    /// Seconds to keep signing keys before fetching them again
    #[clap(long, env = "AUTH_JWKS_TTL", default_value_t = 300)]
    jwks_ttl: u64,

    /// Also obtain a service token with the client credentials grant
    #[clap(long)]
    client_token: bool,

    /// The bearer tokens to validate
    tokens: Vec<Jwt>,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();

    let mut config = AuthServerConfig::new(
        opts.base_url,
        opts.realm,
        opts.client_id,
        opts.client_secret,
    )
    .with_jwks_ttl(DurationSecs(opts.jwks_ttl));

    if let Some(issuer) = opts.issuer {
        config = config.with_issuer(issuer);
    }

    let auth = AuthFacade::new(config)?;

    for token in &opts.tokens {
        match auth.validate(token).await {
            Ok(claims) => tracing::info!(
                sub = %claims.sub(),
                realm = %claims.realm(),
                roles = ?claims.roles(),
                expires_in = claims.time_until_expiration(),
                "token accepted"
            ),
            Err(error) => tracing::warn!(
                token = format_args!("{:#10}", token),
                kind = ?error.kind(),
                %error,
                "token rejected"
            ),
        }
    }

    if opts.client_token {
        let token = auth.client_token().await?;
        tracing::info!(
            token = format_args!("{:#?}", token),
            "obtained service token"
        );
    }

    tracing::info!(stats = ?auth.key_cache().stats(), "done");

    Ok(())
}

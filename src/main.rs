use dotenvy::dotenv;

use video_views::api;
use video_views::config;
use video_views::database;
use video_views::error::ApplicationError;
use video_views::logger;
use video_views::youtube;

#[tokio::main]
async fn main() -> Result<(), ApplicationError> {
    dotenv().ok();

    let config = config::load()?;

    let _guard = logger::init(&config)?;

    let database = database::connect(&config.database()).await?;
    let youtube = youtube::connect(&config.youtube())?;

    let app = api::create_app(database, youtube, &config);
    api::serve(app, &config).await
}

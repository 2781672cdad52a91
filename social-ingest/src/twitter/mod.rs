pub use self::tweet::Tweet;
pub use self::twitter_client::TwitterClient;

mod tweet;
mod twitter_client;

mod mail;
mod slack;
mod webhook;

pub use mail::MailSender;
pub use slack::SlackSender;
pub use webhook::WebhookSender;

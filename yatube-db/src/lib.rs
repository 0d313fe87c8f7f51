pub mod client;
mod record;

#[cfg(test)]
mod tests;

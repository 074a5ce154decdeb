mod cookie;
mod handshake;
mod timeouts;

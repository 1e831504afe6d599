pub mod rest;
pub mod sockets;

//! Minimal lock-step TFTP server for integration tests.
//!
//! One listener per loopback address, all on the same port, so a batch over
//! `127.0.0.1 - 127.0.0.N` reaches a distinct "host" per address. Transfers
//! are answered from a per-transfer socket bound to the listener's address,
//! which keeps the reply source IP equal to the requested host.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tftpfleet::tftp::core::{BLOCK_SIZE, Packet};

type Store = Arc<Mutex<HashMap<(Ipv4Addr, String), Vec<u8>>>>;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn loopback(last: u8) -> Ipv4Addr {
    Ipv4Addr::new(127, 0, 0, last)
}

pub struct FakeServer {
    port: u16,
    files: Store,
    uploads: Store,
    clients: Arc<Mutex<Vec<SocketAddr>>>,
    stop: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl FakeServer {
    /// Listens on every address in `hosts`. Each transfer waits `delay`
    /// before answering.
    pub fn start(hosts: &[Ipv4Addr], delay: Duration) -> Self {
        let first = UdpSocket::bind((hosts[0], 0)).unwrap();
        let port = first.local_addr().unwrap().port();
        let mut listeners = vec![first];
        for host in &hosts[1..] {
            listeners.push(UdpSocket::bind((*host, port)).unwrap());
        }

        let mut server = Self {
            port,
            files: Arc::default(),
            uploads: Arc::default(),
            clients: Arc::default(),
            stop: Arc::new(AtomicBool::new(false)),
            handles: Vec::new(),
        };

        for listener in listeners {
            listener
                .set_read_timeout(Some(Duration::from_millis(50)))
                .unwrap();
            let files = Arc::clone(&server.files);
            let uploads = Arc::clone(&server.uploads);
            let clients = Arc::clone(&server.clients);
            let stop = Arc::clone(&server.stop);
            server.handles.push(thread::spawn(move || {
                serve(listener, files, uploads, clients, stop, delay)
            }));
        }
        server
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn add_file(&self, host: Ipv4Addr, name: &str, content: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert((host, name.to_string()), content.to_vec());
    }

    pub fn uploaded(&self, host: Ipv4Addr, name: &str) -> Option<Vec<u8>> {
        self.uploads
            .lock()
            .unwrap()
            .get(&(host, name.to_string()))
            .cloned()
    }

    /// Source addresses of every request received so far.
    pub fn clients(&self) -> Vec<SocketAddr> {
        self.clients.lock().unwrap().clone()
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn serve(
    listener: UdpSocket,
    files: Store,
    uploads: Store,
    clients: Arc<Mutex<Vec<SocketAddr>>>,
    stop: Arc<AtomicBool>,
    delay: Duration,
) {
    let host = match listener.local_addr().unwrap() {
        SocketAddr::V4(addr) => *addr.ip(),
        SocketAddr::V6(_) => unreachable!(),
    };
    let mut buf = [0u8; 1024];
    while !stop.load(Ordering::SeqCst) {
        let Ok((len, client)) = listener.recv_from(&mut buf) else {
            continue;
        };
        clients.lock().unwrap().push(client);

        let transfer = UdpSocket::bind((host, 0)).unwrap();
        transfer
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        thread::sleep(delay);

        match Packet::deserialize(&buf[..len]) {
            Ok(Packet::Rrq { filename }) => {
                let content = files.lock().unwrap().get(&(host, filename)).cloned();
                match content {
                    Some(content) => send_file(&transfer, client, &content),
                    None => send(
                        &transfer,
                        client,
                        Packet::Error {
                            code: 1,
                            msg: "File not found".to_string(),
                        },
                    ),
                }
            }
            Ok(Packet::Wrq { filename }) => {
                if let Some(content) = receive_file(&transfer, client) {
                    // Uploaded files can be read back
                    files
                        .lock()
                        .unwrap()
                        .insert((host, filename.clone()), content.clone());
                    uploads.lock().unwrap().insert((host, filename), content);
                }
            }
            _ => {}
        }
    }
}

fn send(socket: &UdpSocket, to: SocketAddr, packet: Packet) {
    socket.send_to(&packet.serialize().unwrap(), to).unwrap();
}

fn recv(socket: &UdpSocket) -> Option<Packet> {
    let mut buf = [0u8; 1024];
    let (len, _) = socket.recv_from(&mut buf).ok()?;
    Packet::deserialize(&buf[..len]).ok()
}

fn send_file(socket: &UdpSocket, client: SocketAddr, content: &[u8]) {
    let mut block: u16 = 1;
    let mut offset = 0;
    loop {
        let end = (offset + BLOCK_SIZE).min(content.len());
        let chunk = content[offset..end].to_vec();
        let last = chunk.len() < BLOCK_SIZE;
        send(
            socket,
            client,
            Packet::Data {
                block_num: block,
                data: chunk,
            },
        );
        match recv(socket) {
            Some(Packet::Ack(n)) if n == block => {}
            _ => return,
        }
        if last {
            return;
        }
        offset = end;
        block = block.wrapping_add(1);
    }
}

fn receive_file(socket: &UdpSocket, client: SocketAddr) -> Option<Vec<u8>> {
    send(socket, client, Packet::Ack(0));
    let mut content = Vec::new();
    let mut expected: u16 = 1;
    loop {
        match recv(socket)? {
            Packet::Data { block_num, data } if block_num == expected => {
                content.extend_from_slice(&data);
                send(socket, client, Packet::Ack(block_num));
                if data.len() < BLOCK_SIZE {
                    return Some(content);
                }
                expected = expected.wrapping_add(1);
            }
            _ => return None,
        }
    }
}

use std::collections::HashMap;
use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

struct ReplicaHandle {
    sender: Sender<Vec<u8>>,
    // Recorded opportunistically from `REPLCONF listening-port`; no handler
    // currently surfaces it (see DESIGN.md open-question resolution).
    #[allow(dead_code)]
    listening_port: Option<u16>,
    #[allow(dead_code)]
    ack_offset: Arc<Mutex<u64>>,
    // Detached on drop; the writer loop exits on its own once `sender` is
    // dropped and the channel disconnects.
    #[allow(dead_code)]
    writer: JoinHandle<()>,
}

// propagate() only ever enqueues onto this channel, never touches the
// socket directly, so fan-out never blocks on a slow or wedged replica.
fn spawn_writer(mut stream: TcpStream) -> (Sender<Vec<u8>>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel::<Vec<u8>>();
    let handle = thread::spawn(move || {
        for message in rx {
            if stream.write_all(&message).is_err() {
                break;
            }
        }
    });
    (tx, handle)
}

#[derive(Default)]
pub struct ReplicaTable {
    replicas: HashMap<SocketAddr, ReplicaHandle>,
}

impl ReplicaTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, addr: SocketAddr, stream: TcpStream) {
        let (sender, writer) = spawn_writer(stream);
        self.replicas.insert(
            addr,
            ReplicaHandle {
                sender,
                listening_port: None,
                ack_offset: Arc::new(Mutex::new(0)),
                writer,
            },
        );
    }

    pub fn remove(&mut self, addr: &SocketAddr) {
        self.replicas.remove(addr);
    }

    pub fn set_listening_port(&mut self, addr: &SocketAddr, port: u16) {
        if let Some(handle) = self.replicas.get_mut(addr) {
            handle.listening_port = Some(port);
        }
    }

    pub fn record_ack(&mut self, addr: &SocketAddr, offset: u64) {
        if let Some(handle) = self.replicas.get(addr) {
            *handle.ack_offset.lock().unwrap() = offset;
        }
    }

    pub fn count(&self) -> usize {
        self.replicas.len()
    }

    // A send failing (writer thread already exited) isn't fatal here, the
    // connection runtime removes the replica on its own disconnect detection.
    pub fn propagate(&self, bytes: &[u8]) {
        for handle in self.replicas.values() {
            let _ = handle.sender.send(bytes.to_vec());
        }
    }
}

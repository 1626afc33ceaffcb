//! Background `mio::Poll` event loop shared by every channel in the process.
//!
//! Grounded on `boomnet::service::select::mio`'s registration/readiness
//! idiom, but inverted from that crate's "caller drives `poll()` on its own
//! thread" model into spec.md §5's push model: one dedicated OS thread owns
//! the `Poll` instance and dispatches readiness directly into each
//! registered [`Reactive`]; `send`/`close`/`connect` calls from arbitrary
//! caller threads are funneled in through a command queue plus a
//! `mio::Waker`, matching the cross-thread wakeup `boomnet`'s TLS stream
//! `Source` impl already assumes is available from `mio`.

use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;

use mio::{Events, Interest, Registry, Token, Waker};

const WAKE_TOKEN: Token = Token(usize::MAX);
const EVENTS_CAPACITY: usize = 1024;

/// A channel-side object the reactor drives. Implementors own the actual
/// socket; the reactor only needs to (re)register it and to deliver
/// readiness notifications, never to read or write through it directly.
pub trait Reactive: Send + Sync {
    fn register(&self, registry: &Registry, token: Token, interest: Interest) -> io::Result<()>;
    fn reregister(&self, registry: &Registry, token: Token, interest: Interest) -> io::Result<()>;
    fn deregister(&self, registry: &Registry) -> io::Result<()>;
    fn on_readable(&self);
    fn on_writable(&self);
}

enum Command {
    Register(Token, Interest, Arc<dyn Reactive>),
    Reregister(Token, Interest),
    Deregister(Token),
}

/// Cheap, clonable handle to the process-wide reactor thread.
#[derive(Clone)]
pub struct Reactor {
    commands: Sender<Command>,
    waker: Arc<Waker>,
    next_token: Arc<Mutex<usize>>,
}

impl Reactor {
    fn spawn() -> io::Result<Reactor> {
        let poll = mio::Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKE_TOKEN)?);
        let (tx, rx) = mpsc::channel();

        let reactor = Reactor { commands: tx, waker, next_token: Arc::new(Mutex::new(0)) };

        thread::Builder::new()
            .name("pipechan-reactor".into())
            .spawn(move || run(poll, rx))
            .expect("failed to spawn reactor thread");

        Ok(reactor)
    }

    /// The process-wide reactor, started lazily on first use.
    pub fn global() -> &'static Reactor {
        static REACTOR: OnceLock<Reactor> = OnceLock::new();
        REACTOR.get_or_init(|| Reactor::spawn().expect("failed to start reactor thread"))
    }

    /// Allocate a fresh token for a newly-connecting/accepted channel.
    pub fn next_token(&self) -> Token {
        let mut guard = self.next_token.lock().expect("reactor token counter poisoned");
        let token = Token(*guard);
        *guard += 1;
        token
    }

    pub fn register(&self, token: Token, interest: Interest, reactive: Arc<dyn Reactive>) -> io::Result<()> {
        self.send(Command::Register(token, interest, reactive))
    }

    pub fn reregister(&self, token: Token, interest: Interest) -> io::Result<()> {
        self.send(Command::Reregister(token, interest))
    }

    pub fn deregister(&self, token: Token) -> io::Result<()> {
        self.send(Command::Deregister(token))
    }

    fn send(&self, command: Command) -> io::Result<()> {
        self.commands.send(command).map_err(|_| io::Error::other("reactor thread is gone"))?;
        self.waker.wake()
    }
}

fn run(mut poll: mio::Poll, commands: Receiver<Command>) {
    let mut events = Events::with_capacity(EVENTS_CAPACITY);
    let mut reactives: std::collections::HashMap<Token, Arc<dyn Reactive>> = std::collections::HashMap::new();

    loop {
        if let Err(err) = poll.poll(&mut events, None) {
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            log::error!("reactor poll failed: {err}");
            break;
        }

        for event in events.iter() {
            if event.token() == WAKE_TOKEN {
                while let Ok(command) = commands.try_recv() {
                    apply(&mut poll, &mut reactives, command);
                }
                continue;
            }
            let Some(reactive) = reactives.get(&event.token()) else {
                continue;
            };
            if event.is_readable() {
                reactive.on_readable();
            }
            if event.is_writable() {
                reactive.on_writable();
            }
        }
    }
}

fn apply(poll: &mut mio::Poll, reactives: &mut std::collections::HashMap<Token, Arc<dyn Reactive>>, command: Command) {
    match command {
        Command::Register(token, interest, reactive) => {
            if let Err(err) = reactive.register(poll.registry(), token, interest) {
                log::error!("reactor failed to register token {:?}: {err}", token);
                return;
            }
            reactives.insert(token, reactive);
        }
        Command::Reregister(token, interest) => {
            if let Some(reactive) = reactives.get(&token) {
                if let Err(err) = reactive.reregister(poll.registry(), token, interest) {
                    log::error!("reactor failed to reregister token {:?}: {err}", token);
                }
            }
        }
        Command::Deregister(token) => {
            if let Some(reactive) = reactives.remove(&token) {
                if let Err(err) = reactive.deregister(poll.registry()) {
                    log::error!("reactor failed to deregister token {:?}: {err}", token);
                }
            }
        }
    }
}

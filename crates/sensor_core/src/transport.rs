//! Abstração da conexão serial usada pelo Listener.
//!
//! O daemon implementa [`Transport`] sobre a porta serial real; os testes
//! usam [`FakeTransport`], que recebe bytes de outra thread.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Fonte de bytes com consulta de quantos já estão disponíveis.
pub trait Transport: Send {
    /// Bytes que podem ser lidos agora sem esperar.
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Lê exatamente `buf.len()` bytes.
    ///
    /// `TimedOut` indica que o frame chegou incompleto; qualquer outro
    /// erro é falha da conexão.
    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn bytes_available(&mut self) -> io::Result<usize> {
        (**self).bytes_available()
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        (**self).read_exact(buf)
    }
}

// ──────────────────────────────────────────────
// Fake em memória
// ──────────────────────────────────────────────

#[derive(Debug, Default)]
struct FakeState {
    pending: VecDeque<u8>,
    fault: Option<io::ErrorKind>,
    closed: bool,
}

/// Transporte em memória, clonável: um clone alimenta, outro é lido.
#[derive(Debug, Clone, Default)]
pub struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cria já com bytes na fila.
    pub fn with_bytes(bytes: &[u8]) -> Self {
        let fake = Self::new();
        fake.push(bytes);
        fake
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Anexa bytes como se tivessem chegado pela serial.
    pub fn push(&self, bytes: &[u8]) {
        self.state().pending.extend(bytes.iter().copied());
    }

    /// A próxima operação falha com `kind`.
    pub fn inject_fault(&self, kind: io::ErrorKind) {
        self.state().fault = Some(kind);
    }

    /// Simula a desconexão do dispositivo depois dos bytes pendentes.
    pub fn close(&self) {
        self.state().closed = true;
    }

    pub fn remaining(&self) -> usize {
        self.state().pending.len()
    }
}

impl Transport for FakeTransport {
    fn bytes_available(&mut self) -> io::Result<usize> {
        let mut state = self.state();
        if let Some(kind) = state.fault.take() {
            return Err(io::Error::new(kind, "falha injetada"));
        }
        if state.closed && state.pending.is_empty() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "dispositivo desconectado"));
        }
        Ok(state.pending.len())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        let mut state = self.state();
        if let Some(kind) = state.fault.take() {
            return Err(io::Error::new(kind, "falha injetada"));
        }
        if state.pending.len() < buf.len() {
            // Igual a uma serial com timeout: consome o que havia e desiste.
            state.pending.clear();
            let kind = if state.closed {
                io::ErrorKind::UnexpectedEof
            } else {
                io::ErrorKind::TimedOut
            };
            return Err(io::Error::new(kind, "frame incompleto"));
        }
        for slot in buf.iter_mut() {
            // Tamanho verificado acima.
            *slot = state.pending.pop_front().unwrap_or_default();
        }
        Ok(())
    }
}

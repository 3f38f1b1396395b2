use std::sync::Arc;

use mizu_result::RESULT_SUCCESS;
use mizu_servctl::{LoopbackKernel, ProcessId, SessionId, ThreadId};
use mizu_service::{Reporter, ServiceThread, SessionRequestManager, ThreadContext};
use mizu_service_ns::{
    ApplicationLanguage, ERR_APPLICATION_LANGUAGE_NOT_FOUND, IApplicationManagerInterface,
    LanguageCode, LanguageSource, get_desired_language,
};
use mizu_sf::{CommandBuffer, cmif};
use mizu_sync::Shared;
use proptest::prelude::*;

const PID: ProcessId = ProcessId::new(0xA0);

struct Ns {
    thread: ServiceThread,
    service: Arc<IApplicationManagerInterface>,
}

impl Ns {
    fn new(configured: Shared<LanguageCode>) -> Self {
        let context = ThreadContext::new(
            Arc::new(LoopbackKernel::new()),
            Shared::new(Reporter::default()),
            ThreadId::from_raw(9000),
        );
        let (_tx, rx) = crossbeam_channel::unbounded();
        let source: Arc<dyn LanguageSource> = Arc::new(move || Some(*configured.read()));
        Self {
            thread: ServiceThread::new(context, rx),
            service: Arc::new(IApplicationManagerInterface::new(LanguageCode::EN_US, source)),
        }
    }

    fn open(&mut self) -> SessionId {
        let session = SessionId::fresh();
        self.thread.adopt(
            session,
            SessionRequestManager::with_handler(PID, self.service.clone()),
        );
        session
    }

    fn call(&mut self, session: SessionId, request: cmif::Request) -> CommandBuffer {
        let mut buf = CommandBuffer::new();
        request.encode(&mut buf);
        CommandBuffer::from_words(self.thread.handle_request(session, PID, buf.as_words()))
    }
}

fn desired(ns: &mut Ns, session: SessionId, mask: u32) -> u32 {
    let reply = ns.call(session, cmif::Request::new(1400).push(&mask));
    cmif::parse_response(&reply, false, 4).unwrap().word(0)
}

#[test]
fn test_desired_language_over_ipc() {
    let mut ns = Ns::new(Shared::new(LanguageCode::EN_US));
    let session = ns.open();

    let mask = ApplicationLanguage::Japanese.supported_flag()
        | ApplicationLanguage::Korean.supported_flag();
    assert_eq!(desired(&mut ns, session, mask), ApplicationLanguage::Japanese as u32);
    assert_eq!(desired(&mut ns, session, 0), ApplicationLanguage::AmericanEnglish as u32);
}

#[test]
fn test_convert_language_to_code() {
    let mut ns = Ns::new(Shared::new(LanguageCode::EN_US));
    let session = ns.open();

    let reply = ns.call(session, cmif::Request::new(1401).push(&13u32));
    let response = cmif::parse_response(&reply, false, 8).unwrap();
    assert_eq!(LanguageCode::from_raw(response.u64_at(0)).as_str(), "zh-Hant");

    let reply = ns.call(session, cmif::Request::new(1401).push(&16u32));
    assert_eq!(
        cmif::response_result(&reply, false).unwrap(),
        ERR_APPLICATION_LANGUAGE_NOT_FOUND
    );
}

#[test]
fn test_language_reloads_for_new_sessions() {
    let configured = Shared::new(LanguageCode::EN_US);
    let mut ns = Ns::new(configured.clone());
    let first = ns.open();
    let mask = ApplicationLanguage::French.supported_flag()
        | ApplicationLanguage::CanadianFrench.supported_flag();
    assert_eq!(desired(&mut ns, first, mask), ApplicationLanguage::French as u32);

    *configured.write() = LanguageCode::FR_CA;
    let second = ns.open();
    assert_eq!(ns.service.language(), LanguageCode::FR_CA);
    assert_eq!(desired(&mut ns, second, mask), ApplicationLanguage::CanadianFrench as u32);

    *configured.write() = LanguageCode::from_tag("xx");
    let third = ns.open();
    let reply = ns.call(third, cmif::Request::new(1400).push(&mask));
    assert_eq!(
        cmif::response_result(&reply, false).unwrap(),
        ERR_APPLICATION_LANGUAGE_NOT_FOUND
    );
    let reply = ns.call(third, cmif::Request::new(1401).push(&0u32));
    assert_eq!(cmif::response_result(&reply, false).unwrap(), RESULT_SUCCESS);
}

fn language() -> impl Strategy<Value = ApplicationLanguage> {
    prop::sample::select(ApplicationLanguage::ALL.to_vec())
}

proptest! {
    #[test]
    fn test_desired_language_is_earliest_supported(current in language(), mask in 0u32..0x1_0000) {
        let list = current.priority_list();
        let got = get_desired_language(current, mask);
        if mask == 0 {
            prop_assert_eq!(got, list[0]);
        } else if let Some(pos) = list.iter().position(|l| mask & l.supported_flag() != 0) {
            prop_assert_eq!(got, list[pos]);
        } else {
            prop_assert_eq!(got, current);
        }
    }
}

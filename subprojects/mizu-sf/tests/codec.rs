use mizu_result::RESULT_SUCCESS;
use mizu_sf::{
    CommandBuffer, CommandKind, ResponseFormat, cmif, emit_response, hipc::Header,
    parse_request, push_result,
};
use proptest::prelude::*;

#[test]
fn test_request_response_bit_exact() {
    let mut buf = CommandBuffer::new();
    cmif::Request::new(0x1234_5678)
        .push(&0xDEAD_BEEF_CAFE_BABEu64)
        .encode(&mut buf);

    let request = parse_request(&buf, false).unwrap();
    assert_eq!(request.header.message_type(), 4);
    // SFCI header, command and token (4), alignment reservation (4), u64 (2).
    assert_eq!(request.header.num_data_words(), 10);
    assert_eq!(buf.word(request.data_payload_offset - 2), cmif::IN_HEADER_MAGIC);
    assert_eq!(request.kind, CommandKind::Cmif(cmif::CommandType::Request));
    assert_eq!(request.command, 0x1234_5678);
    assert_eq!(
        buf.reader(request.params_index).pop_u64(),
        0xDEAD_BEEF_CAFE_BABE
    );

    let layout = emit_response(
        &mut buf,
        &ResponseFormat {
            normal_params: 4,
            ..Default::default()
        },
    );
    let mut w = layout.params_writer(&mut buf);
    push_result(&mut w, false, RESULT_SUCCESS);
    w.push_u64(0x1122_3344_5566_7788);

    assert_eq!(buf.word(layout.data_payload_index - 2), cmif::OUT_HEADER_MAGIC);
    let response = cmif::parse_response(&buf, false, 8).unwrap();
    assert_eq!(response.u64_at(0), 0x1122_3344_5566_7788);
}

#[derive(Debug, Clone)]
struct RequestShape {
    pid: Option<u64>,
    copy_handles: Vec<u32>,
    move_handles: Vec<u32>,
    in_buffers: usize,
    data: Vec<u32>,
}

fn request_shape() -> impl Strategy<Value = RequestShape> {
    (
        proptest::option::of(any::<u64>()),
        proptest::collection::vec(1u32..0xFFFF, 0..4),
        proptest::collection::vec(1u32..0xFFFF, 0..4),
        0usize..3,
        proptest::collection::vec(any::<u32>(), 0..8),
    )
        .prop_map(
            |(pid, copy_handles, move_handles, in_buffers, data)| RequestShape {
                pid,
                copy_handles,
                move_handles,
                in_buffers,
                data,
            },
        )
}

fn encode(shape: &RequestShape, id: u32, buf: &mut CommandBuffer) {
    let mut request = cmif::Request::new(id);
    if let Some(pid) = shape.pid {
        request = request.send_pid(pid);
    }
    for &handle in &shape.copy_handles {
        request = request.add_handle(handle);
    }
    for &handle in &shape.move_handles {
        request = request.add_move_handle(handle);
    }
    for i in 0..shape.in_buffers {
        request = request.add_in_buffer(0x1000 * (i as u64 + 1), 0x100);
    }
    for word in &shape.data {
        request = request.push(word);
    }
    request.encode(buf);
}

proptest! {
    #[test]
    fn test_decoded_request_matches_encoded(shape in request_shape(), id in any::<u32>()) {
        let mut buf = CommandBuffer::new();
        encode(&shape, id, &mut buf);

        let request = parse_request(&buf, false).unwrap();
        prop_assert_eq!(request.command, id);
        prop_assert_eq!(request.pid, shape.pid);
        prop_assert_eq!(&request.copy_handles, &shape.copy_handles);
        prop_assert_eq!(&request.move_handles, &shape.move_handles);
        prop_assert_eq!(request.buffer_a.len(), shape.in_buffers);
        prop_assert_eq!((request.data_payload_offset - 2) % 4, 0);
        let mut r = buf.reader(request.params_index);
        for &word in &shape.data {
            prop_assert_eq!(r.pop_u32(), word);
        }
    }

    #[test]
    fn test_response_header_consistent(
        is_domain in any::<bool>(),
        tipc in any::<bool>(),
        params in 0u32..8,
        copies in 0u32..4,
        moves in 0u32..4,
        always_move in any::<bool>(),
    ) {
        let normal_params = params + 2;
        let mut buf = CommandBuffer::new();
        let format = ResponseFormat {
            tipc_type: tipc.then(|| mizu_sf::tipc::CommandType::request(1)),
            is_domain: is_domain && !tipc,
            normal_params,
            num_copy_handles: copies,
            num_move_objects: moves,
            always_move_handles: always_move,
        };
        let layout = emit_response(&mut buf, &format);
        let header = Header::pop(&mut buf.reader(0));

        let declared_handles = layout.num_copy_handles + layout.num_move_handles;
        prop_assert_eq!(declared_handles + layout.num_domain_objects, copies + moves);
        prop_assert_eq!(header.has_special_header(), declared_handles > 0);

        if tipc {
            prop_assert_eq!(header.message_type(), 17);
            prop_assert_eq!(header.num_data_words() as u32, normal_params - 1);
        } else {
            prop_assert_eq!(header.message_type(), 0);
            prop_assert_eq!(buf.word(layout.data_payload_index - 2), cmif::OUT_HEADER_MAGIC);
            let sfco = layout.data_payload_index - 2 - if format.is_domain { 4 } else { 0 };
            prop_assert_eq!(sfco % 4, 0);
            let mut expected = 2 * normal_params + 2 + 4;
            if format.is_domain {
                expected += 4 + layout.num_domain_objects;
            }
            prop_assert_eq!(header.num_data_words() as u32, expected);
        }

        let copy_handles: Vec<u32> = (0..layout.num_copy_handles).map(|i| 0x100 + i).collect();
        let move_handles: Vec<u32> = (0..layout.num_move_handles).map(|i| 0x200 + i).collect();
        prop_assert!(layout.write_handles(&mut buf, &copy_handles, &move_handles).is_ok());
        if let Some(offset) = layout.handles_offset {
            let written: Vec<u32> = (0..declared_handles as usize)
                .map(|i| buf.word(offset + i))
                .collect();
            let expected: Vec<u32> = copy_handles.iter().chain(&move_handles).copied().collect();
            prop_assert_eq!(written, expected);
        }
    }
}

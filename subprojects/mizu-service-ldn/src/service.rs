use std::sync::Arc;

use mizu_result::{ERR_LDN_DISABLED, RESULT_SUCCESS, Result};
use mizu_service::{FunctionInfo, RequestContext, ServiceCore, ServiceFramework};

use crate::proto::{
    CMD_CREATE_USER_LOCAL_COMMUNICATION_SERVICE, SERVICE_NAME_USER, State, user_cmds as cmds,
};

/// `ldn:u` entry point.
pub struct IUserServiceCreator {
    core: ServiceCore,
}

impl IUserServiceCreator {
    pub fn new() -> Self {
        Self {
            core: ServiceCore::new(SERVICE_NAME_USER),
        }
    }

    fn create_user_local_communication_service(
        &self,
        ctx: &mut RequestContext<'_>,
    ) -> Result<()> {
        ctx.response(2, 0, 1)
            .push_result(RESULT_SUCCESS)
            .push_ipc_interface(Arc::new(IUserLocalCommunicationService::new()));
        Ok(())
    }

    const HANDLERS: &'static [FunctionInfo<Self>] = &[FunctionInfo::new(
        CMD_CREATE_USER_LOCAL_COMMUNICATION_SERVICE,
        Some(Self::create_user_local_communication_service),
        "CreateUserLocalCommunicationService",
    )];
}

impl Default for IUserServiceCreator {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceFramework for IUserServiceCreator {
    fn core(&self) -> &ServiceCore {
        &self.core
    }

    fn handlers() -> &'static [FunctionInfo<Self>] {
        Self::HANDLERS
    }
}

pub struct IUserLocalCommunicationService {
    core: ServiceCore,
}

impl IUserLocalCommunicationService {
    pub fn new() -> Self {
        Self {
            core: ServiceCore::new("IUserLocalCommunicationService"),
        }
    }

    fn get_state(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        log::warn!(target: "Service_LDN", "(STUBBED) GetState");
        ctx.response(3, 0, 0)
            .push_result(RESULT_SUCCESS)
            .push_enum(State::Error);
        Ok(())
    }

    fn initialize(&self, _ctx: &mut RequestContext<'_>) -> Result<()> {
        log::warn!(target: "Service_LDN", "(STUBBED) Initialize: local communication is disabled");
        Err(ERR_LDN_DISABLED)
    }

    const HANDLERS: &'static [FunctionInfo<Self>] = &[
        FunctionInfo::new(cmds::GET_STATE, Some(Self::get_state), "GetState"),
        FunctionInfo::new(cmds::GET_NETWORK_INFO, None, "GetNetworkInfo"),
        FunctionInfo::new(cmds::GET_IPV4_ADDRESS, None, "GetIpv4Address"),
        FunctionInfo::new(cmds::GET_DISCONNECT_REASON, None, "GetDisconnectReason"),
        FunctionInfo::new(cmds::GET_SECURITY_PARAMETER, None, "GetSecurityParameter"),
        FunctionInfo::new(cmds::GET_NETWORK_CONFIG, None, "GetNetworkConfig"),
        FunctionInfo::new(cmds::ATTACH_STATE_CHANGE_EVENT, None, "AttachStateChangeEvent"),
        FunctionInfo::new(cmds::GET_NETWORK_INFO_LATEST_UPDATE, None, "GetNetworkInfoLatestUpdate"),
        FunctionInfo::new(cmds::SCAN, None, "Scan"),
        FunctionInfo::new(cmds::SCAN_PRIVATE, None, "ScanPrivate"),
        FunctionInfo::new(
            cmds::SET_WIRELESS_CONTROLLER_RESTRICTION,
            None,
            "SetWirelessControllerRestriction",
        ),
        FunctionInfo::new(cmds::OPEN_ACCESS_POINT, None, "OpenAccessPoint"),
        FunctionInfo::new(cmds::CLOSE_ACCESS_POINT, None, "CloseAccessPoint"),
        FunctionInfo::new(cmds::CREATE_NETWORK, None, "CreateNetwork"),
        FunctionInfo::new(cmds::CREATE_NETWORK_PRIVATE, None, "CreateNetworkPrivate"),
        FunctionInfo::new(cmds::DESTROY_NETWORK, None, "DestroyNetwork"),
        FunctionInfo::new(cmds::REJECT, None, "Reject"),
        FunctionInfo::new(cmds::SET_ADVERTISE_DATA, None, "SetAdvertiseData"),
        FunctionInfo::new(cmds::SET_STATION_ACCEPT_POLICY, None, "SetStationAcceptPolicy"),
        FunctionInfo::new(cmds::ADD_ACCEPT_FILTER_ENTRY, None, "AddAcceptFilterEntry"),
        FunctionInfo::new(cmds::CLEAR_ACCEPT_FILTER, None, "ClearAcceptFilter"),
        FunctionInfo::new(cmds::OPEN_STATION, None, "OpenStation"),
        FunctionInfo::new(cmds::CLOSE_STATION, None, "CloseStation"),
        FunctionInfo::new(cmds::CONNECT, None, "Connect"),
        FunctionInfo::new(cmds::CONNECT_PRIVATE, None, "ConnectPrivate"),
        FunctionInfo::new(cmds::DISCONNECT, None, "Disconnect"),
        FunctionInfo::new(cmds::INITIALIZE, Some(Self::initialize), "Initialize"),
        FunctionInfo::new(cmds::FINALIZE, None, "Finalize"),
        FunctionInfo::new(cmds::INITIALIZE2, None, "Initialize2"),
    ];
}

impl Default for IUserLocalCommunicationService {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceFramework for IUserLocalCommunicationService {
    fn core(&self) -> &ServiceCore {
        &self.core
    }

    fn handlers() -> &'static [FunctionInfo<Self>] {
        Self::HANDLERS
    }
}

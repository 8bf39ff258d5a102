// Copyright 2025 RISC Zero, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Contract interfaces of the bonding protocol.

alloy::sol! {
    #[sol(rpc, all_derives)]
    interface IBondingManager {
        event Bond(address indexed newDelegate, address indexed oldDelegate, address indexed delegator, uint256 additionalAmount, uint256 bondedAmount);
        event Unbond(address indexed delegate, address indexed delegator, uint256 unbondingLockId, uint256 amount, uint256 withdrawRound);
        event Rebond(address indexed delegate, address indexed delegator, uint256 unbondingLockId, uint256 amount);
        event WithdrawStake(address indexed delegator, uint256 unbondingLockId, uint256 amount, uint256 withdrawRound);
        event Reward(address indexed transcoder, uint256 amount);

        function getDelegator(address delegator) external view returns (uint256 bondedAmount, uint256 fees, address delegateAddress, uint256 delegatedAmount, uint256 startRound, uint256 lastClaimRound, uint256 nextUnbondingLockId);
        function getDelegatorUnbondingLock(address delegator, uint256 unbondingLockId) external view returns (uint256 amount, uint256 withdrawRound);
        function delegatorStatus(address delegator) external view returns (uint8);
        function pendingStake(address delegator, uint256 endRound) external view returns (uint256);
        function pendingFees(address delegator, uint256 endRound) external view returns (uint256);

        function getTranscoder(address transcoder) external view returns (uint256 lastRewardRound, uint256 rewardCut, uint256 feeShare, uint256 lastActiveStakeUpdateRound, uint256 activationRound, uint256 deactivationRound);
        function getTranscoderEarningsPoolForRound(address transcoder, uint256 round) external view returns (uint256 rewardPool, uint256 feePool, uint256 totalStake, uint256 claimableStake, uint256 transcoderRewardCut, uint256 transcoderFeeShare, uint256 transcoderRewardPool, uint256 transcoderFeePool, bool hasTranscoderRewardFeePool);
        function transcoderStatus(address transcoder) external view returns (uint8);
        function transcoderTotalStake(address transcoder) external view returns (uint256);
        function isActiveTranscoder(address transcoder) external view returns (bool);
        function getFirstTranscoderInPool() external view returns (address);
        function getNextTranscoderInPool(address transcoder) external view returns (address);

        function bond(uint256 amount, address to) external;
        function bondWithHint(uint256 amount, address to, address oldDelegateNewPosPrev, address oldDelegateNewPosNext, address currDelegateNewPosPrev, address currDelegateNewPosNext) external;
        function unbond(uint256 amount) external;
        function unbondWithHint(uint256 amount, address newPosPrev, address newPosNext) external;
        function rebond(uint256 unbondingLockId) external;
        function rebondWithHint(uint256 unbondingLockId, address newPosPrev, address newPosNext) external;
        function rebondFromUnbonded(address to, uint256 unbondingLockId) external;
        function rebondFromUnbondedWithHint(address to, uint256 unbondingLockId, address newPosPrev, address newPosNext) external;
        function withdrawStake(uint256 unbondingLockId) external;
        function withdrawFees() external;
        function claimEarnings(uint256 endRound) external;
    }
}

alloy::sol! {
    /// Bonding manager getters as deployed before unbonding locks existed.
    #[sol(rpc, all_derives)]
    interface IBondingManagerGenesis {
        function getDelegator(address delegator) external view returns (uint256 bondedAmount, uint256 fees, address delegateAddress, uint256 delegatedAmount, uint256 startRound, uint256 withdrawRound, uint256 lastClaimRound);
        function getTranscoderEarningsPoolForRound(address transcoder, uint256 round) external view returns (uint256 rewardPool, uint256 feePool, uint256 totalStake, uint256 claimableStake);
    }
}

alloy::sol! {
    #[sol(rpc, all_derives)]
    interface IRoundsManager {
        function currentRound() external view returns (uint256);
        function currentRoundInitialized() external view returns (bool);
        function currentRoundStartBlock() external view returns (uint256);
        function lastInitializedRound() external view returns (uint256);
        function roundLength() external view returns (uint256);
        function initializeRound() external;
    }
}

alloy::sol! {
    #[sol(rpc, all_derives)]
    interface ILivepeerToken {
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 value) external returns (bool);
    }
}
